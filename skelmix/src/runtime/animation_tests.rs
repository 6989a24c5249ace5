use std::collections::HashMap;
use std::sync::Arc;

use crate::runtime::animation::{apply_animation, apply_timeline};
use crate::{
    Animation, AttachmentData, AttachmentFrame, AttachmentTimeline, BoneData, ColorFrame, Curve,
    DeformFrame, DeformTimeline, DrawOrderFrame, DrawOrderTimeline, Event, EventFrame,
    EventTimeline, IkConstraintData, IkConstraintTimeline, IkFrame, MixBlend, MixDirection,
    RgbaTimeline, RotateFrame, RotateTimeline, Skeleton, SkeletonData, SlotData, Timeline,
    ValueFrame, XyFrame,
};

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}

fn skeleton() -> Skeleton {
    let mut data = SkeletonData::default();
    let mut root = BoneData::new("root");
    root.rotation = 10.0;
    root.x = 5.0;
    data.bones.push(root);

    let mut slot = SlotData::new("slot", 0);
    slot.attachment = Some("a".to_string());
    data.slots.push(slot);
    data.slots.push(SlotData::new("other", 0));

    let mut attachments = HashMap::new();
    attachments.insert(
        "mesh".to_string(),
        AttachmentData {
            vertices: vec![1.0, 2.0],
            weighted: false,
        },
    );
    data.attachments.push(attachments);
    data.attachments.push(HashMap::new());

    data.ik_constraints.push(IkConstraintData::new("arm"));

    Skeleton::new(Arc::new(data))
}

fn rotate(frames: &[(f32, f32, Curve)]) -> Timeline {
    Timeline::Rotate(RotateTimeline {
        bone_index: 0,
        frames: frames
            .iter()
            .map(|&(time, rotation, curve)| RotateFrame {
                time,
                rotation,
                curve,
            })
            .collect(),
    })
}

fn linear_rotate(frames: &[(f32, f32)]) -> Timeline {
    rotate(
        &frames
            .iter()
            .map(|&(t, r)| (t, r, Curve::Linear))
            .collect::<Vec<_>>(),
    )
}

#[test]
fn rotate_interpolates_relative_to_setup() {
    let mut skeleton = skeleton();
    let timeline = linear_rotate(&[(0.0, 0.0), (1.0, 90.0)]);

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.5,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    // Setup rotation is 10, keyed value 45.
    assert_close(skeleton.bones[0].rotation, 55.0);
}

#[test]
fn rotate_holds_after_last_frame() {
    let mut skeleton = skeleton();
    let timeline = linear_rotate(&[(0.0, 0.0), (1.0, 90.0)]);

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        3.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_close(skeleton.bones[0].rotation, 100.0);
}

#[test]
fn rotate_before_first_frame() {
    let mut skeleton = skeleton();
    skeleton.bones[0].rotation = 77.0;
    let timeline = linear_rotate(&[(0.5, 90.0)]);

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_close(skeleton.bones[0].rotation, 77.0);

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        1.0,
        MixBlend::Setup,
        MixDirection::In,
    );
    assert_close(skeleton.bones[0].rotation, 10.0);
}

#[test]
fn rotate_alpha_scales_blend() {
    let mut skeleton = skeleton();
    let timeline = linear_rotate(&[(0.0, 80.0)]);

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        0.25,
        MixBlend::Setup,
        MixDirection::In,
    );
    // Quarter of the way from setup (10) toward setup + 80.
    assert_close(skeleton.bones[0].rotation, 30.0);
}

#[test]
fn stepped_curve_holds_until_next_frame() {
    let mut skeleton = skeleton();
    let timeline = rotate(&[(0.0, 0.0, Curve::Stepped), (1.0, 90.0, Curve::Linear)]);

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.99,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_close(skeleton.bones[0].rotation, 10.0);

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        1.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_close(skeleton.bones[0].rotation, 100.0);
}

#[test]
fn bezier_curve_stays_within_frame_values() {
    let curve = Curve::Bezier {
        cx1: 0.25,
        cy1: 0.0,
        cx2: 0.75,
        cy2: 90.0,
    };
    let timeline = rotate(&[(0.0, 0.0, curve), (1.0, 90.0, Curve::Linear)]);

    let mut previous = -1.0f32;
    for step in 0..=10 {
        let time = step as f32 / 10.0;
        let mut skeleton = skeleton();
        apply_timeline(
            &timeline,
            &mut skeleton,
            -1.0,
            time,
            None,
            1.0,
            MixBlend::Replace,
            MixDirection::In,
        );
        let value = skeleton.bones[0].rotation - 10.0;
        assert!((-1e-3..=90.001).contains(&value), "value {value} at {time}");
        assert!(value >= previous - 1e-3, "not monotonic at {time}");
        previous = value;
    }
}

#[test]
fn translate_offsets_from_setup() {
    let mut skeleton = skeleton();
    let timeline = Timeline::Translate(crate::BoneXyTimeline {
        bone_index: 0,
        frames: vec![XyFrame {
            time: 0.0,
            x: 10.0,
            y: 20.0,
            curve: [Curve::Linear; 2],
        }],
    });

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    // Setup x is 5.
    assert_close(skeleton.bones[0].x, 15.0);
    assert_close(skeleton.bones[0].y, 20.0);
}

#[test]
fn scale_multiplies_setup() {
    let mut skeleton = skeleton();
    skeleton.bones[0].scale_x = 1.0;
    let timeline = Timeline::ScaleX(crate::BoneValueTimeline {
        bone_index: 0,
        frames: vec![ValueFrame {
            time: 0.0,
            value: 1.5,
            curve: Curve::Linear,
        }],
    });

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_close(skeleton.bones[0].scale_x, 1.5);
}

#[test]
fn rgba_sets_color_and_lerps_with_alpha() {
    let mut skeleton = skeleton();
    let timeline = Timeline::Rgba(RgbaTimeline {
        slot_index: 0,
        frames: vec![ColorFrame {
            time: 0.0,
            color: [0.0, 0.2, 0.4, 1.0],
            curve: [Curve::Linear; 4],
        }],
    });

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_eq!(skeleton.slots[0].color, [0.0, 0.2, 0.4, 1.0]);

    // Half mix from setup white.
    let mut skeleton = self::skeleton();
    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        0.5,
        MixBlend::Setup,
        MixDirection::In,
    );
    assert_close(skeleton.slots[0].color[0], 0.5);
    assert_close(skeleton.slots[0].color[1], 0.6);
    assert_close(skeleton.slots[0].color[2], 0.7);
    assert_close(skeleton.slots[0].color[3], 1.0);
}

#[test]
fn attachment_snaps_to_frame() {
    let mut skeleton = skeleton();
    let timeline = Timeline::Attachment(AttachmentTimeline {
        slot_index: 0,
        frames: vec![
            AttachmentFrame {
                time: 0.0,
                name: Some("a".to_string()),
            },
            AttachmentFrame {
                time: 0.5,
                name: Some("b".to_string()),
            },
            AttachmentFrame {
                time: 1.0,
                name: None,
            },
        ],
    });

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.6,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("b"));

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        1.2,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_eq!(skeleton.slots[0].attachment, None);

    // Mixing out only restores the setup attachment for setup blends.
    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.6,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::Out,
    );
    assert_eq!(skeleton.slots[0].attachment, None);

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.6,
        None,
        1.0,
        MixBlend::Setup,
        MixDirection::Out,
    );
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("a"));
}

#[test]
fn draw_order_applies_and_restores() {
    let mut skeleton = skeleton();
    let timeline = Timeline::DrawOrder(DrawOrderTimeline {
        frames: vec![
            DrawOrderFrame {
                time: 0.0,
                draw_order: Some(vec![1, 0]),
            },
            DrawOrderFrame {
                time: 1.0,
                draw_order: None,
            },
        ],
    });

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.2,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_eq!(skeleton.draw_order, vec![1, 0]);

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        1.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_eq!(skeleton.draw_order, vec![0, 1]);
}

#[test]
fn deform_requires_matching_attachment() {
    let mut skeleton = skeleton();
    let timeline = Timeline::Deform(DeformTimeline {
        slot_index: 0,
        attachment: "mesh".to_string(),
        frames: vec![DeformFrame {
            time: 0.0,
            vertices: vec![3.0, 6.0],
            curve: Curve::Linear,
        }],
    });

    // Slot shows "a", not "mesh": no deform written.
    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert!(skeleton.slots[0].deform.is_empty());

    skeleton.slots[0].set_attachment(Some("mesh"));
    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_eq!(skeleton.slots[0].deform, vec![3.0, 6.0]);
}

#[test]
fn deform_lerps_from_bind_pose_with_alpha() {
    let mut skeleton = skeleton();
    skeleton.slots[0].set_attachment(Some("mesh"));
    let timeline = Timeline::Deform(DeformTimeline {
        slot_index: 0,
        attachment: "mesh".to_string(),
        frames: vec![DeformFrame {
            time: 0.0,
            vertices: vec![3.0, 6.0],
            curve: Curve::Linear,
        }],
    });

    // Empty deform forces a setup blend: halfway from the bind pose
    // vertices [1, 2].
    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        0.5,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_close(skeleton.slots[0].deform[0], 2.0);
    assert_close(skeleton.slots[0].deform[1], 4.0);
}

#[test]
fn deform_skips_frames_with_uneven_vertex_counts() {
    let mut skeleton = skeleton();
    skeleton.slots[0].set_attachment(Some("mesh"));
    let timeline = Timeline::Deform(DeformTimeline {
        slot_index: 0,
        attachment: "mesh".to_string(),
        frames: vec![
            DeformFrame {
                time: 0.0,
                vertices: vec![3.0, 6.0],
                curve: Curve::Linear,
            },
            DeformFrame {
                time: 1.0,
                vertices: vec![9.0],
                curve: Curve::Linear,
            },
        ],
    });

    for time in [0.5, 2.0] {
        apply_timeline(
            &timeline,
            &mut skeleton,
            -1.0,
            time,
            None,
            1.0,
            MixBlend::Replace,
            MixDirection::In,
        );
        assert!(skeleton.slots[0].deform.is_empty());
    }
}

#[test]
fn events_fire_in_half_open_interval() {
    let timeline = Timeline::Event(EventTimeline {
        frames: vec![
            EventFrame {
                time: 0.2,
                event: Event::new(0.2, "a"),
            },
            EventFrame {
                time: 0.5,
                event: Event::new(0.5, "b"),
            },
            EventFrame {
                time: 0.8,
                event: Event::new(0.8, "c"),
            },
        ],
    });
    let mut skeleton = skeleton();

    let mut events = Vec::new();
    apply_timeline(
        &timeline,
        &mut skeleton,
        0.3,
        0.6,
        Some(&mut events),
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "b");

    let mut events = Vec::new();
    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.25,
        Some(&mut events),
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "a");
}

#[test]
fn looped_animation_fires_events_across_wrap_once() {
    let animation = Animation::new(
        "loop",
        vec![Timeline::Event(EventTimeline {
            frames: vec![
                EventFrame {
                    time: 0.05,
                    event: Event::new(0.05, "head"),
                },
                EventFrame {
                    time: 0.95,
                    event: Event::new(0.95, "tail"),
                },
            ],
        })],
        1.0,
    );
    let mut skeleton = skeleton();

    let mut events = Vec::new();
    apply_animation(
        &animation,
        &mut skeleton,
        0.9,
        1.1,
        true,
        Some(&mut events),
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    let names = events.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["tail", "head"]);
}

#[test]
fn looped_animation_wraps_time() {
    let animation = Animation::new(
        "spin",
        vec![linear_rotate(&[(0.0, 0.0), (1.0, 90.0)])],
        1.0,
    );
    let mut skeleton = skeleton();

    apply_animation(
        &animation,
        &mut skeleton,
        -1.0,
        1.5,
        true,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_close(skeleton.bones[0].rotation, 55.0);
}

#[test]
fn ik_timeline_applies_mix_and_flags() {
    let mut skeleton = skeleton();
    let timeline = Timeline::IkConstraint(IkConstraintTimeline {
        constraint_index: 0,
        frames: vec![IkFrame {
            time: 0.0,
            mix: 0.5,
            softness: 2.0,
            bend_direction: -1,
            compress: true,
            stretch: false,
            curve: [Curve::Linear; 2],
        }],
    });

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    let constraint = &skeleton.ik_constraints[0];
    assert_close(constraint.mix, 0.5);
    assert_close(constraint.softness, 2.0);
    assert_eq!(constraint.bend_direction, -1);
    assert!(constraint.compress);
    assert!(!constraint.stretch);

    // Mixing out keeps the pose flags from setup.
    let mut skeleton = self::skeleton();
    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        0.5,
        MixBlend::Setup,
        MixDirection::Out,
    );
    let constraint = &skeleton.ik_constraints[0];
    assert_close(constraint.mix, 0.75);
    assert_eq!(constraint.bend_direction, 1);
    assert!(!constraint.compress);
}

#[test]
fn inactive_bone_is_skipped() {
    let mut skeleton = skeleton();
    skeleton.bones[0].active = false;
    let timeline = linear_rotate(&[(0.0, 90.0)]);

    apply_timeline(
        &timeline,
        &mut skeleton,
        -1.0,
        0.0,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_close(skeleton.bones[0].rotation, 10.0);
}

#[test]
fn full_turn_accumulates_instead_of_wrapping() {
    let animation = Animation::new(
        "spin",
        vec![linear_rotate(&[(0.0, 0.0), (1.0, 360.0)])],
        1.0,
    );
    let mut skeleton = skeleton();

    apply_animation(
        &animation,
        &mut skeleton,
        -1.0,
        0.5,
        false,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    assert_close(skeleton.bones[0].rotation, 190.0);

    apply_animation(
        &animation,
        &mut skeleton,
        0.5,
        1.0,
        false,
        None,
        1.0,
        MixBlend::Replace,
        MixDirection::In,
    );
    // A full turn lands a revolution past setup, not back on it.
    assert_close(skeleton.bones[0].rotation, 370.0);
}
