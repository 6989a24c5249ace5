//! Timeline evaluation: computes keyed property values at a point in time
//! and blends them into the skeleton pose.

use crate::model::*;
use crate::runtime::Skeleton;

/// Applies every timeline of `animation` in declaration order.
///
/// When `looping` and the animation has a duration, `time` (and a positive
/// `last_time`) are wrapped into the animation before evaluation, so a
/// single linear clock produces repeating playback. `last_time` is only
/// used for event firing; `events` receives events keyed in
/// `(last_time, time]`, accounting for loop wrap.
#[allow(clippy::too_many_arguments)]
pub fn apply_animation(
    animation: &Animation,
    skeleton: &mut Skeleton,
    last_time: f32,
    time: f32,
    looping: bool,
    mut events: Option<&mut Vec<Event>>,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let mut time = time;
    let mut last_time = last_time;
    if looping && animation.duration != 0.0 {
        time %= animation.duration;
        if last_time > 0.0 {
            last_time %= animation.duration;
        }
    }

    for timeline in &animation.timelines {
        apply_timeline(
            timeline,
            skeleton,
            last_time,
            time,
            events.as_deref_mut(),
            alpha,
            blend,
            direction,
        );
    }
}

/// Applies a single timeline. Targets that fall outside the skeleton (data
/// from a different lineage) are skipped.
#[allow(clippy::too_many_arguments)]
pub fn apply_timeline(
    timeline: &Timeline,
    skeleton: &mut Skeleton,
    last_time: f32,
    time: f32,
    events: Option<&mut Vec<Event>>,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    match timeline {
        Timeline::Rotate(t) => apply_rotate(t, skeleton, time, alpha, blend),
        Timeline::Translate(t) => apply_bone_offset_pair(
            t,
            skeleton,
            time,
            alpha,
            blend,
            |d| (d.x, d.y),
            |b| (b.x, b.y),
            |b, x, y| {
                b.x = x;
                b.y = y;
            },
        ),
        Timeline::TranslateX(t) => apply_bone_offset(
            t,
            skeleton,
            time,
            alpha,
            blend,
            |d| d.x,
            |b| b.x,
            |b, v| b.x = v,
        ),
        Timeline::TranslateY(t) => apply_bone_offset(
            t,
            skeleton,
            time,
            alpha,
            blend,
            |d| d.y,
            |b| b.y,
            |b, v| b.y = v,
        ),
        Timeline::Scale(t) => apply_scale(t, skeleton, time, alpha, blend, direction),
        Timeline::ScaleX(t) => apply_scale_axis(
            t,
            skeleton,
            time,
            alpha,
            blend,
            direction,
            |d| d.scale_x,
            |b| b.scale_x,
            |b, v| b.scale_x = v,
        ),
        Timeline::ScaleY(t) => apply_scale_axis(
            t,
            skeleton,
            time,
            alpha,
            blend,
            direction,
            |d| d.scale_y,
            |b| b.scale_y,
            |b, v| b.scale_y = v,
        ),
        Timeline::Shear(t) => apply_bone_offset_pair(
            t,
            skeleton,
            time,
            alpha,
            blend,
            |d| (d.shear_x, d.shear_y),
            |b| (b.shear_x, b.shear_y),
            |b, x, y| {
                b.shear_x = x;
                b.shear_y = y;
            },
        ),
        Timeline::ShearX(t) => apply_bone_offset(
            t,
            skeleton,
            time,
            alpha,
            blend,
            |d| d.shear_x,
            |b| b.shear_x,
            |b, v| b.shear_x = v,
        ),
        Timeline::ShearY(t) => apply_bone_offset(
            t,
            skeleton,
            time,
            alpha,
            blend,
            |d| d.shear_y,
            |b| b.shear_y,
            |b, v| b.shear_y = v,
        ),
        Timeline::Rgba(t) => apply_rgba(t, skeleton, time, alpha, blend),
        Timeline::Rgb(t) => apply_rgb(t, skeleton, time, alpha, blend),
        Timeline::Alpha(t) => apply_alpha(t, skeleton, time, alpha, blend),
        Timeline::Rgba2(t) => apply_rgba2(t, skeleton, time, alpha, blend),
        Timeline::Rgb2(t) => apply_rgb2(t, skeleton, time, alpha, blend),
        Timeline::Attachment(t) => apply_attachment(t, skeleton, time, blend, direction),
        Timeline::Deform(t) => apply_deform(t, skeleton, time, alpha, blend),
        Timeline::Event(t) => apply_event(t, last_time, time, events),
        Timeline::DrawOrder(t) => apply_draw_order(t, skeleton, time, blend, direction),
        Timeline::IkConstraint(t) => apply_ik_constraint(t, skeleton, time, alpha, blend, direction),
        Timeline::TransformConstraint(t) => {
            apply_transform_constraint(t, skeleton, time, alpha, blend)
        }
        Timeline::PathConstraintPosition(t) => apply_path_value(
            t,
            skeleton,
            time,
            alpha,
            blend,
            |d| d.position,
            |c| c.position,
            |c, v| c.position = v,
        ),
        Timeline::PathConstraintSpacing(t) => apply_path_value(
            t,
            skeleton,
            time,
            alpha,
            blend,
            |d| d.spacing,
            |c| c.spacing,
            |c, v| c.spacing = v,
        ),
        Timeline::PathConstraintMix(t) => apply_path_mix(t, skeleton, time, alpha, blend),
    }
}

// Curve evaluation. Beziers are flattened with the incremental
// forward-difference scheme into 9 (x, y) samples, then the samples are
// walked and linearly interpolated.

const BEZIER_SEGMENTS: usize = 9;

pub(crate) fn curve_value(
    curve: &Curve,
    time: f32,
    time1: f32,
    value1: f32,
    time2: f32,
    value2: f32,
) -> f32 {
    match *curve {
        Curve::Linear => value1 + (time - time1) / (time2 - time1) * (value2 - value1),
        Curve::Stepped => value1,
        Curve::Bezier { cx1, cy1, cx2, cy2 } => {
            bezier_value(time, time1, value1, cx1, cy1, cx2, cy2, time2, value2)
        }
    }
}

/// Normalized progress in [0, 1] between two frames; used by deform frames
/// whose values cannot be interpolated componentwise by `curve_value`.
pub(crate) fn curve_percent(curve: &Curve, time: f32, time1: f32, time2: f32) -> f32 {
    match *curve {
        Curve::Linear => (time - time1) / (time2 - time1),
        Curve::Stepped => 0.0,
        Curve::Bezier { cx1, cy1, cx2, cy2 } => {
            bezier_value(time, time1, 0.0, cx1, cy1, cx2, cy2, time2, 1.0)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn bezier_value(
    time: f32,
    x1: f32,
    y1: f32,
    cx1: f32,
    cy1: f32,
    cx2: f32,
    cy2: f32,
    x2: f32,
    y2: f32,
) -> f32 {
    let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.03;
    let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.03;
    let dddx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.006;
    let dddy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.006;
    let mut ddx = tmpx * 2.0 + dddx;
    let mut ddy = tmpy * 2.0 + dddy;
    let mut dx = (cx1 - x1) * 0.3 + tmpx + dddx * 0.16666667;
    let mut dy = (cy1 - y1) * 0.3 + tmpy + dddy * 0.16666667;
    let mut x = x1 + dx;
    let mut y = y1 + dy;

    if x > time {
        return y1 + (time - x1) / (x - x1) * (y - y1);
    }
    let mut px = x;
    let mut py = y;
    for _ in 1..BEZIER_SEGMENTS {
        dx += ddx;
        dy += ddy;
        ddx += dddx;
        ddy += dddy;
        x += dx;
        y += dy;
        if x >= time {
            return py + (time - px) / (x - px) * (y - py);
        }
        px = x;
        py = y;
    }
    py + (time - px) / (x2 - px) * (y2 - py)
}

// Frame sampling. `time` is at or after the first frame; at or after the
// last frame the last value holds.

fn frame_index<T>(frames: &[T], time: f32, time_of: impl Fn(&T) -> f32) -> usize {
    frames.partition_point(|f| time_of(f) <= time).max(1) - 1
}

pub(crate) fn sample_rotate(frames: &[RotateFrame], time: f32) -> f32 {
    let i = frame_index(frames, time, |f| f.time);
    let f = &frames[i];
    match frames.get(i + 1) {
        None => f.rotation,
        Some(n) => curve_value(&f.curve, time, f.time, f.rotation, n.time, n.rotation),
    }
}

fn sample_value(frames: &[ValueFrame], time: f32) -> f32 {
    let i = frame_index(frames, time, |f| f.time);
    let f = &frames[i];
    match frames.get(i + 1) {
        None => f.value,
        Some(n) => curve_value(&f.curve, time, f.time, f.value, n.time, n.value),
    }
}

fn sample_xy(frames: &[XyFrame], time: f32) -> (f32, f32) {
    let i = frame_index(frames, time, |f| f.time);
    let f = &frames[i];
    match frames.get(i + 1) {
        None => (f.x, f.y),
        Some(n) => (
            curve_value(&f.curve[0], time, f.time, f.x, n.time, n.x),
            curve_value(&f.curve[1], time, f.time, f.y, n.time, n.y),
        ),
    }
}

fn sample_rgba(frames: &[ColorFrame], time: f32) -> [f32; 4] {
    let i = frame_index(frames, time, |f| f.time);
    let f = &frames[i];
    match frames.get(i + 1) {
        None => f.color,
        Some(n) => std::array::from_fn(|c| {
            curve_value(&f.curve[c], time, f.time, f.color[c], n.time, n.color[c])
        }),
    }
}

fn sample_rgb(frames: &[RgbFrame], time: f32) -> [f32; 3] {
    let i = frame_index(frames, time, |f| f.time);
    let f = &frames[i];
    match frames.get(i + 1) {
        None => f.rgb,
        Some(n) => std::array::from_fn(|c| {
            curve_value(&f.curve[c], time, f.time, f.rgb[c], n.time, n.rgb[c])
        }),
    }
}

fn sample_rgba2(frames: &[Rgba2Frame], time: f32) -> ([f32; 4], [f32; 3]) {
    let i = frame_index(frames, time, |f| f.time);
    let f = &frames[i];
    match frames.get(i + 1) {
        None => (f.light, f.dark),
        Some(n) => (
            std::array::from_fn(|c| {
                curve_value(&f.curve[c], time, f.time, f.light[c], n.time, n.light[c])
            }),
            std::array::from_fn(|c| {
                curve_value(&f.curve[4 + c], time, f.time, f.dark[c], n.time, n.dark[c])
            }),
        ),
    }
}

fn sample_rgb2(frames: &[Rgb2Frame], time: f32) -> ([f32; 3], [f32; 3]) {
    let i = frame_index(frames, time, |f| f.time);
    let f = &frames[i];
    match frames.get(i + 1) {
        None => (f.light, f.dark),
        Some(n) => (
            std::array::from_fn(|c| {
                curve_value(&f.curve[c], time, f.time, f.light[c], n.time, n.light[c])
            }),
            std::array::from_fn(|c| {
                curve_value(&f.curve[3 + c], time, f.time, f.dark[c], n.time, n.dark[c])
            }),
        ),
    }
}

// Bone timelines.

pub(crate) fn apply_rotate(
    t: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    if t.frames.is_empty() {
        return;
    }
    let Some(setup) = skeleton.data.bones.get(t.bone_index).map(|b| b.rotation) else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(t.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => bone.rotation = setup,
            MixBlend::First => bone.rotation += (setup - bone.rotation) * alpha,
            _ => {}
        }
        return;
    }

    let r = sample_rotate(&t.frames, time);
    match blend {
        MixBlend::Setup => bone.rotation = setup + r * alpha,
        MixBlend::First | MixBlend::Replace => {
            bone.rotation += (r + setup - bone.rotation) * alpha;
        }
        MixBlend::Add => bone.rotation += r * alpha,
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_bone_offset(
    t: &BoneValueTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    setup_of: impl Fn(&BoneData) -> f32,
    get: impl Fn(&crate::runtime::Bone) -> f32,
    set: impl Fn(&mut crate::runtime::Bone, f32),
) {
    if t.frames.is_empty() {
        return;
    }
    let Some(setup) = skeleton.data.bones.get(t.bone_index).map(setup_of) else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(t.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => set(bone, setup),
            MixBlend::First => {
                let v = get(bone);
                set(bone, v + (setup - v) * alpha);
            }
            _ => {}
        }
        return;
    }

    let value = sample_value(&t.frames, time);
    let current = get(bone);
    match blend {
        MixBlend::Setup => set(bone, setup + value * alpha),
        MixBlend::First | MixBlend::Replace => {
            set(bone, current + (setup + value - current) * alpha)
        }
        MixBlend::Add => set(bone, current + value * alpha),
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_bone_offset_pair(
    t: &BoneXyTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    setup_of: impl Fn(&BoneData) -> (f32, f32),
    get: impl Fn(&crate::runtime::Bone) -> (f32, f32),
    set: impl Fn(&mut crate::runtime::Bone, f32, f32),
) {
    if t.frames.is_empty() {
        return;
    }
    let Some((sx, sy)) = skeleton.data.bones.get(t.bone_index).map(setup_of) else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(t.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => set(bone, sx, sy),
            MixBlend::First => {
                let (cx, cy) = get(bone);
                set(bone, cx + (sx - cx) * alpha, cy + (sy - cy) * alpha);
            }
            _ => {}
        }
        return;
    }

    let (x, y) = sample_xy(&t.frames, time);
    let (cx, cy) = get(bone);
    match blend {
        MixBlend::Setup => set(bone, sx + x * alpha, sy + y * alpha),
        MixBlend::First | MixBlend::Replace => set(
            bone,
            cx + (sx + x - cx) * alpha,
            cy + (sy + y - cy) * alpha,
        ),
        MixBlend::Add => set(bone, cx + x * alpha, cy + y * alpha),
    }
}

/// Blends one scale component. `value` is the keyed multiplier already
/// applied to the setup scale. Mixing out keeps the sign of the pose being
/// left; mixing in adopts the sign of the key, so a crossfade never travels
/// through a mirrored pose.
fn mix_scale_component(
    current: f32,
    setup: f32,
    value: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) -> f32 {
    if alpha == 1.0 {
        return if blend == MixBlend::Add {
            current + value - setup
        } else {
            value
        };
    }
    match direction {
        MixDirection::Out => match blend {
            MixBlend::Setup => setup + (value.abs() * setup.signum() - setup) * alpha,
            MixBlend::First | MixBlend::Replace => {
                current + (value.abs() * current.signum() - current) * alpha
            }
            MixBlend::Add => current + (value - setup) * alpha,
        },
        MixDirection::In => match blend {
            MixBlend::Setup => {
                let b = setup.abs() * value.signum();
                b + (value - b) * alpha
            }
            MixBlend::First | MixBlend::Replace => {
                let b = current.abs() * value.signum();
                b + (value - b) * alpha
            }
            MixBlend::Add => current + (value - setup) * alpha,
        },
    }
}

fn apply_scale(
    t: &BoneXyTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    if t.frames.is_empty() {
        return;
    }
    let Some((sx, sy)) = skeleton
        .data
        .bones
        .get(t.bone_index)
        .map(|b| (b.scale_x, b.scale_y))
    else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(t.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => {
                bone.scale_x = sx;
                bone.scale_y = sy;
            }
            MixBlend::First => {
                bone.scale_x += (sx - bone.scale_x) * alpha;
                bone.scale_y += (sy - bone.scale_y) * alpha;
            }
            _ => {}
        }
        return;
    }

    let (kx, ky) = sample_xy(&t.frames, time);
    let x = kx * sx;
    let y = ky * sy;
    bone.scale_x = mix_scale_component(bone.scale_x, sx, x, alpha, blend, direction);
    bone.scale_y = mix_scale_component(bone.scale_y, sy, y, alpha, blend, direction);
}

#[allow(clippy::too_many_arguments)]
fn apply_scale_axis(
    t: &BoneValueTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
    setup_of: impl Fn(&BoneData) -> f32,
    get: impl Fn(&crate::runtime::Bone) -> f32,
    set: impl Fn(&mut crate::runtime::Bone, f32),
) {
    if t.frames.is_empty() {
        return;
    }
    let Some(setup) = skeleton.data.bones.get(t.bone_index).map(setup_of) else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(t.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => set(bone, setup),
            MixBlend::First => {
                let v = get(bone);
                set(bone, v + (setup - v) * alpha);
            }
            _ => {}
        }
        return;
    }

    let value = sample_value(&t.frames, time) * setup;
    let mixed = mix_scale_component(get(bone), setup, value, alpha, blend, direction);
    set(bone, mixed);
}

// Slot color timelines.

fn slot_setup_color(skeleton: &Skeleton, slot_index: usize) -> Option<([f32; 4], [f32; 3])> {
    let data = skeleton.data.slots.get(slot_index)?;
    Some((data.color, data.dark_color))
}

fn slot_target<'a>(
    skeleton: &'a mut Skeleton,
    slot_index: usize,
) -> Option<&'a mut crate::runtime::Slot> {
    let bone = skeleton.slots.get(slot_index)?.bone;
    if !skeleton.bones.get(bone)?.active {
        return None;
    }
    skeleton.slots.get_mut(slot_index)
}

fn apply_rgba(t: &RgbaTimeline, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
    if t.frames.is_empty() {
        return;
    }
    let Some((setup, _)) = slot_setup_color(skeleton, t.slot_index) else {
        return;
    };
    let Some(slot) = slot_target(skeleton, t.slot_index) else {
        return;
    };

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => slot.color = setup,
            MixBlend::First => {
                for c in 0..4 {
                    slot.color[c] += (setup[c] - slot.color[c]) * alpha;
                }
            }
            _ => {}
        }
        return;
    }

    let value = sample_rgba(&t.frames, time);
    if alpha == 1.0 {
        slot.color = value;
    } else {
        if blend == MixBlend::Setup {
            slot.color = setup;
        }
        for c in 0..4 {
            slot.color[c] += (value[c] - slot.color[c]) * alpha;
        }
    }
}

fn apply_rgb(t: &RgbTimeline, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
    if t.frames.is_empty() {
        return;
    }
    let Some((setup, _)) = slot_setup_color(skeleton, t.slot_index) else {
        return;
    };
    let Some(slot) = slot_target(skeleton, t.slot_index) else {
        return;
    };

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => slot.color[..3].copy_from_slice(&setup[..3]),
            MixBlend::First => {
                for c in 0..3 {
                    slot.color[c] += (setup[c] - slot.color[c]) * alpha;
                }
            }
            _ => {}
        }
        return;
    }

    let value = sample_rgb(&t.frames, time);
    if alpha == 1.0 {
        slot.color[..3].copy_from_slice(&value);
    } else {
        if blend == MixBlend::Setup {
            slot.color[..3].copy_from_slice(&setup[..3]);
        }
        for c in 0..3 {
            slot.color[c] += (value[c] - slot.color[c]) * alpha;
        }
    }
}

fn apply_alpha(t: &AlphaTimeline, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
    if t.frames.is_empty() {
        return;
    }
    let Some((setup, _)) = slot_setup_color(skeleton, t.slot_index) else {
        return;
    };
    let Some(slot) = slot_target(skeleton, t.slot_index) else {
        return;
    };

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => slot.color[3] = setup[3],
            MixBlend::First => slot.color[3] += (setup[3] - slot.color[3]) * alpha,
            _ => {}
        }
        return;
    }

    let value = sample_value(&t.frames, time);
    if alpha == 1.0 {
        slot.color[3] = value;
    } else {
        if blend == MixBlend::Setup {
            slot.color[3] = setup[3];
        }
        slot.color[3] += (value - slot.color[3]) * alpha;
    }
}

fn apply_rgba2(t: &Rgba2Timeline, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
    if t.frames.is_empty() {
        return;
    }
    let Some((setup_light, setup_dark)) = slot_setup_color(skeleton, t.slot_index) else {
        return;
    };
    let Some(slot) = slot_target(skeleton, t.slot_index) else {
        return;
    };

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => {
                slot.color = setup_light;
                slot.dark_color = setup_dark;
            }
            MixBlend::First => {
                for c in 0..4 {
                    slot.color[c] += (setup_light[c] - slot.color[c]) * alpha;
                }
                for c in 0..3 {
                    slot.dark_color[c] += (setup_dark[c] - slot.dark_color[c]) * alpha;
                }
            }
            _ => {}
        }
        return;
    }

    let (light, dark) = sample_rgba2(&t.frames, time);
    if alpha == 1.0 {
        slot.color = light;
        slot.dark_color = dark;
    } else {
        if blend == MixBlend::Setup {
            slot.color = setup_light;
            slot.dark_color = setup_dark;
        }
        for c in 0..4 {
            slot.color[c] += (light[c] - slot.color[c]) * alpha;
        }
        for c in 0..3 {
            slot.dark_color[c] += (dark[c] - slot.dark_color[c]) * alpha;
        }
    }
}

fn apply_rgb2(t: &Rgb2Timeline, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
    if t.frames.is_empty() {
        return;
    }
    let Some((setup_light, setup_dark)) = slot_setup_color(skeleton, t.slot_index) else {
        return;
    };
    let Some(slot) = slot_target(skeleton, t.slot_index) else {
        return;
    };

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => {
                slot.color[..3].copy_from_slice(&setup_light[..3]);
                slot.dark_color = setup_dark;
            }
            MixBlend::First => {
                for c in 0..3 {
                    slot.color[c] += (setup_light[c] - slot.color[c]) * alpha;
                    slot.dark_color[c] += (setup_dark[c] - slot.dark_color[c]) * alpha;
                }
            }
            _ => {}
        }
        return;
    }

    let (light, dark) = sample_rgb2(&t.frames, time);
    if alpha == 1.0 {
        slot.color[..3].copy_from_slice(&light);
        slot.dark_color = dark;
    } else {
        if blend == MixBlend::Setup {
            slot.color[..3].copy_from_slice(&setup_light[..3]);
            slot.dark_color = setup_dark;
        }
        for c in 0..3 {
            slot.color[c] += (light[c] - slot.color[c]) * alpha;
            slot.dark_color[c] += (dark[c] - slot.dark_color[c]) * alpha;
        }
    }
}

// Attachment and draw order snap to the frame at or before `time`; they are
// never interpolated.

pub(crate) fn attachment_name_at(t: &AttachmentTimeline, time: f32) -> Option<&str> {
    let i = frame_index(&t.frames, time, |f| f.time);
    t.frames[i].name.as_deref()
}

fn apply_attachment(
    t: &AttachmentTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    if t.frames.is_empty() {
        return;
    }
    let setup = skeleton
        .data
        .slots
        .get(t.slot_index)
        .and_then(|s| s.attachment.clone());
    let Some(slot) = slot_target(skeleton, t.slot_index) else {
        return;
    };

    if direction == MixDirection::Out {
        if blend == MixBlend::Setup {
            slot.set_attachment(setup.as_deref());
        }
        return;
    }

    if time < t.frames[0].time {
        if blend == MixBlend::Setup || blend == MixBlend::First {
            slot.set_attachment(setup.as_deref());
        }
        return;
    }

    let name = attachment_name_at(t, time).map(str::to_string);
    slot.set_attachment(name.as_deref());
}

fn apply_draw_order(
    t: &DrawOrderTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    if t.frames.is_empty() {
        return;
    }

    if direction == MixDirection::Out {
        if blend == MixBlend::Setup {
            reset_draw_order(skeleton);
        }
        return;
    }

    if time < t.frames[0].time {
        if blend == MixBlend::Setup || blend == MixBlend::First {
            reset_draw_order(skeleton);
        }
        return;
    }

    let i = frame_index(&t.frames, time, |f| f.time);
    match &t.frames[i].draw_order {
        None => reset_draw_order(skeleton),
        Some(order) => {
            for (position, slot_index) in order.iter().enumerate() {
                if let Some(slot) = skeleton.draw_order.get_mut(position) {
                    *slot = *slot_index;
                }
            }
        }
    }
}

fn reset_draw_order(skeleton: &mut Skeleton) {
    for (i, index) in skeleton.draw_order.iter_mut().enumerate() {
        *index = i;
    }
}

// Deform.

fn apply_deform(t: &DeformTimeline, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
    if t.frames.is_empty() {
        return;
    }
    let weighted;
    let setup_vertices;
    {
        let Some(slot) = skeleton.slots.get(t.slot_index) else {
            return;
        };
        let Some(bone) = skeleton.bones.get(slot.bone) else {
            return;
        };
        if !bone.active {
            return;
        }
        if slot.attachment.as_deref() != Some(t.attachment.as_str()) {
            return;
        }
        let Some(attachment) = skeleton.data.attachment(t.slot_index, &t.attachment) else {
            return;
        };
        weighted = attachment.weighted;
        setup_vertices = attachment.vertices.clone();
    }
    let Some(slot) = skeleton.slots.get_mut(t.slot_index) else {
        return;
    };

    let vertex_count = t.frames[0].vertices.len();
    if t.frames.iter().any(|f| f.vertices.len() != vertex_count) {
        return;
    }
    let mut blend = blend;
    if slot.deform.is_empty() {
        blend = MixBlend::Setup;
    }
    let deform = &mut slot.deform;

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => deform.clear(),
            MixBlend::First => {
                if alpha == 1.0 {
                    deform.clear();
                    return;
                }
                deform.resize(vertex_count, 0.0);
                if weighted {
                    let keep = 1.0 - alpha;
                    for d in deform.iter_mut() {
                        *d *= keep;
                    }
                } else {
                    for (d, s) in deform.iter_mut().zip(&setup_vertices) {
                        *d += (s - *d) * alpha;
                    }
                }
            }
            _ => {}
        }
        return;
    }

    deform.resize(vertex_count, 0.0);
    let setup = |i: usize| setup_vertices.get(i).copied().unwrap_or(0.0);

    let last = &t.frames[t.frames.len() - 1];
    if time >= last.time {
        let values = &last.vertices;
        if alpha == 1.0 {
            if blend == MixBlend::Add {
                for i in 0..vertex_count {
                    deform[i] += values[i] - if weighted { 0.0 } else { setup(i) };
                }
            } else {
                deform.copy_from_slice(values);
            }
        } else {
            match blend {
                MixBlend::Setup => {
                    for i in 0..vertex_count {
                        let s = if weighted { 0.0 } else { setup(i) };
                        deform[i] = s + (values[i] - s) * alpha;
                    }
                }
                MixBlend::First | MixBlend::Replace => {
                    for i in 0..vertex_count {
                        deform[i] += (values[i] - deform[i]) * alpha;
                    }
                }
                MixBlend::Add => {
                    for i in 0..vertex_count {
                        deform[i] += (values[i] - if weighted { 0.0 } else { setup(i) }) * alpha;
                    }
                }
            }
        }
        return;
    }

    let fi = frame_index(&t.frames, time, |f| f.time);
    let frame = &t.frames[fi];
    let next = &t.frames[fi + 1];
    let percent = curve_percent(&frame.curve, time, frame.time, next.time);
    let lerp = |i: usize| {
        let prev = frame.vertices[i];
        prev + (next.vertices[i] - prev) * percent
    };

    if alpha == 1.0 {
        if blend == MixBlend::Add {
            for i in 0..vertex_count {
                deform[i] += lerp(i) - if weighted { 0.0 } else { setup(i) };
            }
        } else {
            for i in 0..vertex_count {
                deform[i] = lerp(i);
            }
        }
    } else {
        match blend {
            MixBlend::Setup => {
                for i in 0..vertex_count {
                    let s = if weighted { 0.0 } else { setup(i) };
                    deform[i] = s + (lerp(i) - s) * alpha;
                }
            }
            MixBlend::First | MixBlend::Replace => {
                for i in 0..vertex_count {
                    deform[i] += (lerp(i) - deform[i]) * alpha;
                }
            }
            MixBlend::Add => {
                for i in 0..vertex_count {
                    deform[i] += (lerp(i) - if weighted { 0.0 } else { setup(i) }) * alpha;
                }
            }
        }
    }
}

// Events.

/// Fires events keyed in `(last_time, time]`. A wrapped clock
/// (`last_time > time`) fires the tail of the animation first, then the
/// head, so a loop boundary delivers each event exactly once.
fn apply_event(
    t: &EventTimeline,
    last_time: f32,
    time: f32,
    events: Option<&mut Vec<Event>>,
) {
    let Some(events) = events else {
        return;
    };
    if t.frames.is_empty() {
        return;
    }

    let mut last_time = last_time;
    if last_time > time {
        collect_frames(&t.frames, last_time, f32::MAX, events);
        last_time = -1.0;
    } else if last_time >= t.frames[t.frames.len() - 1].time {
        return;
    }
    if time < t.frames[0].time {
        return;
    }
    collect_frames(&t.frames, last_time, time, events);
}

fn collect_frames(frames: &[EventFrame], last_time: f32, time: f32, events: &mut Vec<Event>) {
    let start = if last_time < frames[0].time {
        0
    } else {
        frames.partition_point(|f| f.time <= last_time)
    };
    for frame in &frames[start..] {
        if frame.time > time {
            break;
        }
        events.push(frame.event.clone());
    }
}

// Constraints.

fn apply_ik_constraint(
    t: &IkConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    if t.frames.is_empty() {
        return;
    }
    let Some(data) = skeleton.data.ik_constraints.get(t.constraint_index).cloned() else {
        return;
    };
    let Some(constraint) = skeleton.ik_constraints.get_mut(t.constraint_index) else {
        return;
    };
    if !constraint.active {
        return;
    }

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => {
                constraint.mix = data.mix;
                constraint.softness = data.softness;
                constraint.bend_direction = data.bend_direction;
                constraint.compress = data.compress;
                constraint.stretch = data.stretch;
            }
            MixBlend::First => {
                constraint.mix += (data.mix - constraint.mix) * alpha;
                constraint.softness += (data.softness - constraint.softness) * alpha;
                constraint.bend_direction = data.bend_direction;
                constraint.compress = data.compress;
                constraint.stretch = data.stretch;
            }
            _ => {}
        }
        return;
    }

    let i = frame_index(&t.frames, time, |f| f.time);
    let frame = &t.frames[i];
    let (mix, softness) = match t.frames.get(i + 1) {
        None => (frame.mix, frame.softness),
        Some(n) => (
            curve_value(&frame.curve[0], time, frame.time, frame.mix, n.time, n.mix),
            curve_value(
                &frame.curve[1],
                time,
                frame.time,
                frame.softness,
                n.time,
                n.softness,
            ),
        ),
    };

    if blend == MixBlend::Setup {
        constraint.mix = data.mix + (mix - data.mix) * alpha;
        constraint.softness = data.softness + (softness - data.softness) * alpha;
        if direction == MixDirection::Out {
            constraint.bend_direction = data.bend_direction;
            constraint.compress = data.compress;
            constraint.stretch = data.stretch;
        } else {
            constraint.bend_direction = frame.bend_direction;
            constraint.compress = frame.compress;
            constraint.stretch = frame.stretch;
        }
    } else {
        constraint.mix += (mix - constraint.mix) * alpha;
        constraint.softness += (softness - constraint.softness) * alpha;
        if direction == MixDirection::In {
            constraint.bend_direction = frame.bend_direction;
            constraint.compress = frame.compress;
            constraint.stretch = frame.stretch;
        }
    }
}

fn apply_transform_constraint(
    t: &TransformConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    if t.frames.is_empty() {
        return;
    }
    let Some(data) = skeleton
        .data
        .transform_constraints
        .get(t.constraint_index)
        .cloned()
    else {
        return;
    };
    let Some(constraint) = skeleton.transform_constraints.get_mut(t.constraint_index) else {
        return;
    };
    if !constraint.active {
        return;
    }

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => {
                constraint.mix_rotate = data.mix_rotate;
                constraint.mix_x = data.mix_x;
                constraint.mix_y = data.mix_y;
                constraint.mix_scale_x = data.mix_scale_x;
                constraint.mix_scale_y = data.mix_scale_y;
                constraint.mix_shear_y = data.mix_shear_y;
            }
            MixBlend::First => {
                constraint.mix_rotate += (data.mix_rotate - constraint.mix_rotate) * alpha;
                constraint.mix_x += (data.mix_x - constraint.mix_x) * alpha;
                constraint.mix_y += (data.mix_y - constraint.mix_y) * alpha;
                constraint.mix_scale_x += (data.mix_scale_x - constraint.mix_scale_x) * alpha;
                constraint.mix_scale_y += (data.mix_scale_y - constraint.mix_scale_y) * alpha;
                constraint.mix_shear_y += (data.mix_shear_y - constraint.mix_shear_y) * alpha;
            }
            _ => {}
        }
        return;
    }

    let i = frame_index(&t.frames, time, |f| f.time);
    let frame = &t.frames[i];
    let values: [f32; 6] = match t.frames.get(i + 1) {
        None => [
            frame.mix_rotate,
            frame.mix_x,
            frame.mix_y,
            frame.mix_scale_x,
            frame.mix_scale_y,
            frame.mix_shear_y,
        ],
        Some(n) => {
            let from = [
                frame.mix_rotate,
                frame.mix_x,
                frame.mix_y,
                frame.mix_scale_x,
                frame.mix_scale_y,
                frame.mix_shear_y,
            ];
            let to = [
                n.mix_rotate,
                n.mix_x,
                n.mix_y,
                n.mix_scale_x,
                n.mix_scale_y,
                n.mix_shear_y,
            ];
            std::array::from_fn(|c| {
                curve_value(&frame.curve[c], time, frame.time, from[c], n.time, to[c])
            })
        }
    };

    if blend == MixBlend::Setup {
        constraint.mix_rotate = data.mix_rotate + (values[0] - data.mix_rotate) * alpha;
        constraint.mix_x = data.mix_x + (values[1] - data.mix_x) * alpha;
        constraint.mix_y = data.mix_y + (values[2] - data.mix_y) * alpha;
        constraint.mix_scale_x = data.mix_scale_x + (values[3] - data.mix_scale_x) * alpha;
        constraint.mix_scale_y = data.mix_scale_y + (values[4] - data.mix_scale_y) * alpha;
        constraint.mix_shear_y = data.mix_shear_y + (values[5] - data.mix_shear_y) * alpha;
    } else {
        constraint.mix_rotate += (values[0] - constraint.mix_rotate) * alpha;
        constraint.mix_x += (values[1] - constraint.mix_x) * alpha;
        constraint.mix_y += (values[2] - constraint.mix_y) * alpha;
        constraint.mix_scale_x += (values[3] - constraint.mix_scale_x) * alpha;
        constraint.mix_scale_y += (values[4] - constraint.mix_scale_y) * alpha;
        constraint.mix_shear_y += (values[5] - constraint.mix_shear_y) * alpha;
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_path_value(
    t: &PathValueTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    setup_of: impl Fn(&PathConstraintData) -> f32,
    get: impl Fn(&crate::runtime::PathConstraint) -> f32,
    set: impl Fn(&mut crate::runtime::PathConstraint, f32),
) {
    if t.frames.is_empty() {
        return;
    }
    let Some(setup) = skeleton
        .data
        .path_constraints
        .get(t.constraint_index)
        .map(setup_of)
    else {
        return;
    };
    let Some(constraint) = skeleton.path_constraints.get_mut(t.constraint_index) else {
        return;
    };
    if !constraint.active {
        return;
    }

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => set(constraint, setup),
            MixBlend::First => {
                let v = get(constraint);
                set(constraint, v + (setup - v) * alpha);
            }
            _ => {}
        }
        return;
    }

    let value = sample_value(&t.frames, time);
    if blend == MixBlend::Setup {
        set(constraint, setup + (value - setup) * alpha);
    } else {
        let v = get(constraint);
        set(constraint, v + (value - v) * alpha);
    }
}

fn apply_path_mix(
    t: &PathMixTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    if t.frames.is_empty() {
        return;
    }
    let Some(data) = skeleton.data.path_constraints.get(t.constraint_index).cloned() else {
        return;
    };
    let Some(constraint) = skeleton.path_constraints.get_mut(t.constraint_index) else {
        return;
    };
    if !constraint.active {
        return;
    }

    if time < t.frames[0].time {
        match blend {
            MixBlend::Setup => {
                constraint.mix_rotate = data.mix_rotate;
                constraint.mix_x = data.mix_x;
                constraint.mix_y = data.mix_y;
            }
            MixBlend::First => {
                constraint.mix_rotate += (data.mix_rotate - constraint.mix_rotate) * alpha;
                constraint.mix_x += (data.mix_x - constraint.mix_x) * alpha;
                constraint.mix_y += (data.mix_y - constraint.mix_y) * alpha;
            }
            _ => {}
        }
        return;
    }

    let i = frame_index(&t.frames, time, |f| f.time);
    let frame = &t.frames[i];
    let (rotate, x, y) = match t.frames.get(i + 1) {
        None => (frame.mix_rotate, frame.mix_x, frame.mix_y),
        Some(n) => (
            curve_value(
                &frame.curve[0],
                time,
                frame.time,
                frame.mix_rotate,
                n.time,
                n.mix_rotate,
            ),
            curve_value(&frame.curve[1], time, frame.time, frame.mix_x, n.time, n.mix_x),
            curve_value(&frame.curve[2], time, frame.time, frame.mix_y, n.time, n.mix_y),
        ),
    };

    if blend == MixBlend::Setup {
        constraint.mix_rotate = data.mix_rotate + (rotate - data.mix_rotate) * alpha;
        constraint.mix_x = data.mix_x + (x - data.mix_x) * alpha;
        constraint.mix_y = data.mix_y + (y - data.mix_y) * alpha;
    } else {
        constraint.mix_rotate += (rotate - constraint.mix_rotate) * alpha;
        constraint.mix_x += (x - constraint.mix_x) * alpha;
        constraint.mix_y += (y - constraint.mix_y) * alpha;
    }
}
