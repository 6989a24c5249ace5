use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::{
    Animation, AnimationState, AnimationStateData, AnimationStateEvent, AnimationStateListener,
    BoneData, Curve, Error, Event, EventFrame, EventTimeline, MixBlend, RotateFrame,
    RotateTimeline, Skeleton, SkeletonData, SlotData, Timeline, TrackEntrySnapshot,
};

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}

fn rotate_animation(name: &str, frames: &[(f32, f32)], duration: f32) -> Animation {
    Animation::new(
        name,
        vec![Timeline::Rotate(RotateTimeline {
            bone_index: 0,
            frames: frames
                .iter()
                .map(|&(time, rotation)| RotateFrame {
                    time,
                    rotation,
                    curve: Curve::Linear,
                })
                .collect(),
        })],
        duration,
    )
}

fn event_animation(name: &str, times: &[f32], duration: f32) -> Animation {
    Animation::new(
        name,
        vec![Timeline::Event(EventTimeline {
            frames: times
                .iter()
                .map(|&time| EventFrame {
                    time,
                    event: Event::new(time, format!("at{time}")),
                })
                .collect(),
        })],
        duration,
    )
}

fn fixture(animations: Vec<Animation>) -> (AnimationState, Skeleton) {
    let mut data = SkeletonData::default();
    data.bones.push(BoneData::new("root"));
    let mut slot = SlotData::new("slot", 0);
    slot.attachment = Some("a".to_string());
    data.slots.push(slot);
    data.attachments.push(Default::default());
    for animation in animations {
        data.add_animation(animation);
    }
    let data = Arc::new(data);
    let skeleton = Skeleton::new(data.clone());
    let state = AnimationState::new(AnimationStateData::new(data));
    (state, skeleton)
}

#[derive(Clone, Default)]
struct Recorder {
    rows: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    fn listener(&self) -> RecorderListener {
        RecorderListener {
            rows: self.rows.clone(),
        }
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.rows.borrow_mut())
    }

    fn count(&self, label: &str) -> usize {
        self.rows.borrow().iter().filter(|r| *r == label).count()
    }
}

struct RecorderListener {
    rows: Rc<RefCell<Vec<String>>>,
}

impl AnimationStateListener for RecorderListener {
    fn on_event(
        &mut self,
        _state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    ) {
        let label = match event {
            AnimationStateEvent::Start => "start".to_string(),
            AnimationStateEvent::Interrupt => "interrupt".to_string(),
            AnimationStateEvent::End => "end".to_string(),
            AnimationStateEvent::Dispose => "dispose".to_string(),
            AnimationStateEvent::Complete => "complete".to_string(),
            AnimationStateEvent::Event(e) => format!("event {}", e.name),
        };
        self.rows
            .borrow_mut()
            .push(format!("{}:{label}", entry.animation_name));
    }
}

#[test]
fn set_animation_poses_skeleton() {
    let (mut state, mut skeleton) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);

    assert!(!state.apply(&mut skeleton));

    state.set_animation(0, "a", false).unwrap();
    assert!(state.apply(&mut skeleton));
    assert_close(skeleton.bones[0].rotation, 90.0);
}

#[test]
fn unknown_animation_is_an_error() {
    let (mut state, _) = fixture(vec![]);
    match state.set_animation(0, "missing", false) {
        Err(Error::UnknownAnimation { name }) => assert_eq!(name, "missing"),
        other => panic!("expected unknown animation error, got {other:?}"),
    }
    assert!(state.add_animation(0, "missing", false, 0.0).is_err());
}

#[test]
fn start_and_complete_notifications() {
    let (mut state, mut skeleton) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());

    state.set_animation(0, "a", false).unwrap();
    assert_eq!(recorder.take(), vec!["a:start"]);

    state.update(0.5);
    state.apply(&mut skeleton);
    assert_eq!(recorder.count("a:complete"), 0);

    state.update(0.5);
    state.apply(&mut skeleton);
    assert_eq!(recorder.count("a:complete"), 1);

    // Completion is reported once for a non-looping animation.
    state.update(0.5);
    state.apply(&mut skeleton);
    assert_eq!(recorder.count("a:complete"), 1);
}

#[test]
fn looped_animation_completes_each_loop() {
    let (mut state, mut skeleton) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());
    state.set_animation(0, "a", true).unwrap();

    let mut completes = 0;
    for _ in 0..4 {
        state.update(0.6);
        state.apply(&mut skeleton);
        completes = recorder.count("a:complete");
    }
    // 2.4 seconds of a 1 second loop: two loop boundaries crossed.
    assert_eq!(completes, 2);
}

#[test]
fn keyed_event_fires_once_per_loop() {
    let (mut state, mut skeleton) = fixture(vec![event_animation("a", &[0.5], 1.0)]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());
    state.set_animation(0, "a", true).unwrap();

    state.update(0.4);
    state.apply(&mut skeleton);
    assert_eq!(recorder.count("a:event at0.5"), 0);

    state.update(0.2);
    state.apply(&mut skeleton);
    assert_eq!(recorder.count("a:event at0.5"), 1);

    // Crossing the loop boundary does not re-fire the event.
    state.update(0.5);
    state.apply(&mut skeleton);
    assert_eq!(recorder.count("a:event at0.5"), 1);

    // The second pass over 0.5 does.
    state.update(0.5);
    state.apply(&mut skeleton);
    assert_eq!(recorder.count("a:event at0.5"), 2);
}

#[test]
fn queued_animation_starts_when_previous_completes() {
    let (mut state, mut skeleton) = fixture(vec![
        rotate_animation("a", &[(0.0, 90.0)], 1.0),
        rotate_animation("b", &[(0.0, 45.0)], 1.0),
    ]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());

    state.set_animation(0, "a", false).unwrap();
    let queued = state.add_animation(0, "b", false, 0.0).unwrap();
    assert_close(state.track_entry(queued).unwrap().delay, 1.0);

    for _ in 0..2 {
        state.update(0.5);
        state.apply(&mut skeleton);
        let entry = state.current(0).and_then(|h| state.track_entry(h)).unwrap();
        assert_eq!(entry.animation.name, "a");
    }

    state.update(0.5);
    state.apply(&mut skeleton);
    let entry = state.current(0).and_then(|h| state.track_entry(h)).unwrap();
    assert_eq!(entry.animation.name, "b");
    assert_eq!(recorder.count("a:interrupt"), 1);
    assert_eq!(recorder.count("b:start"), 1);
}

#[test]
fn empty_animation_mixes_back_to_setup() {
    let (mut state, mut skeleton) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);

    state.set_animation(0, "a", false).unwrap();
    state.apply(&mut skeleton);
    assert_close(skeleton.bones[0].rotation, 90.0);

    state.set_empty_animation(0, 1.0);
    state.update(0.5);
    state.apply(&mut skeleton);
    assert_close(skeleton.bones[0].rotation, 45.0);

    state.update(0.6);
    state.apply(&mut skeleton);
    assert_close(skeleton.bones[0].rotation, 0.0);
}

#[test]
fn set_empty_animations_fades_every_track() {
    let (mut state, mut skeleton) = fixture(vec![
        rotate_animation("a", &[(0.0, 90.0)], 1.0),
        rotate_animation("b", &[(0.0, 45.0)], 1.0),
    ]);
    state.set_animation(0, "a", false).unwrap();
    state.set_animation(1, "b", false).unwrap();
    state.apply(&mut skeleton);

    state.set_empty_animations(0.5);
    for track in 0..2 {
        let entry = state
            .current(track)
            .and_then(|h| state.track_entry(h))
            .unwrap();
        assert_eq!(entry.animation.name, "<empty>");
        assert_close(entry.mix_duration, 0.5);
    }
}

#[test]
fn clear_track_ends_and_disposes() {
    let (mut state, mut skeleton) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());

    let handle = state.set_animation(0, "a", false).unwrap();
    state.apply(&mut skeleton);

    state.clear_track(0);
    assert_eq!(recorder.count("a:end"), 1);
    assert_eq!(recorder.count("a:dispose"), 1);
    assert!(state.current(0).is_none());
    assert!(state.track_entry(handle).is_none());
}

#[test]
fn replacing_a_never_applied_entry_discards_it() {
    let (mut state, _) = fixture(vec![
        rotate_animation("a", &[(0.0, 90.0)], 1.0),
        rotate_animation("b", &[(0.0, 45.0)], 1.0),
    ]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());

    state.set_animation(0, "a", false).unwrap();
    let b = state.set_animation(0, "b", false).unwrap();

    assert_eq!(
        recorder.take(),
        vec!["a:start", "a:interrupt", "a:end", "a:dispose", "b:start"]
    );
    // No crossfade from an entry that never posed the skeleton.
    let entry = state.track_entry(b).unwrap();
    assert_eq!(entry.animation.name, "b");
}

#[test]
fn track_end_clears_the_track() {
    let (mut state, mut skeleton) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());

    let handle = state.set_animation(0, "a", false).unwrap();
    handle.set_track_end(&mut state, 1.0);

    for _ in 0..4 {
        state.update(0.5);
        state.apply(&mut skeleton);
    }
    assert!(state.current(0).is_none());
    assert_eq!(recorder.count("a:end"), 1);
    assert_eq!(recorder.count("a:dispose"), 1);
}

#[test]
fn handle_setters_round_trip() {
    let (mut state, _) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);
    let handle = state.set_animation(0, "a", true).unwrap();

    handle.set_time_scale(&mut state, 2.0);
    handle.set_alpha(&mut state, 0.5);
    handle.set_mix_blend(&mut state, MixBlend::Add);
    handle.set_hold_previous(&mut state, true);
    handle.set_reverse(&mut state, true);
    handle.set_event_threshold(&mut state, 0.25);
    handle.set_attachment_threshold(&mut state, 0.5);
    handle.set_draw_order_threshold(&mut state, 0.75);
    handle.set_animation_start(&mut state, 0.1);
    handle.set_animation_end(&mut state, 0.9);

    let entry = state.track_entry(handle).unwrap();
    assert_close(entry.time_scale, 2.0);
    assert_close(entry.alpha, 0.5);
    assert_eq!(entry.mix_blend, MixBlend::Add);
    assert!(entry.hold_previous);
    assert!(entry.reverse);
    assert_close(entry.event_threshold, 0.25);
    assert_close(entry.attachment_threshold, 0.5);
    assert_close(entry.draw_order_threshold, 0.75);
    assert_close(entry.animation_start, 0.1);
    assert_close(entry.animation_end, 0.9);
}

#[test]
fn entry_time_scale_speeds_up_playback() {
    let (mut state, mut skeleton) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());

    let handle = state.set_animation(0, "a", false).unwrap();
    handle.set_time_scale(&mut state, 2.0);

    state.update(0.5);
    state.apply(&mut skeleton);
    assert_eq!(recorder.count("a:complete"), 1);
}

#[test]
fn state_time_scale_freezes_playback_at_zero() {
    let (mut state, mut skeleton) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());
    state.time_scale = 0.0;

    state.set_animation(0, "a", false).unwrap();
    for _ in 0..5 {
        state.update(1.0);
        state.apply(&mut skeleton);
    }
    assert_eq!(recorder.count("a:complete"), 0);
    assert_close(
        state
            .current(0)
            .and_then(|h| state.track_entry(h))
            .unwrap()
            .track_time,
        0.0,
    );
}

#[test]
fn add_animation_on_empty_track_starts_immediately() {
    let (mut state, mut skeleton) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());

    state.add_animation(0, "a", false, 0.0).unwrap();
    assert_eq!(recorder.count("a:start"), 1);

    state.apply(&mut skeleton);
    assert_close(skeleton.bones[0].rotation, 90.0);
}

#[test]
fn clear_tracks_removes_everything() {
    let (mut state, _) = fixture(vec![
        rotate_animation("a", &[(0.0, 90.0)], 1.0),
        rotate_animation("b", &[(0.0, 45.0)], 1.0),
    ]);
    state.set_animation(0, "a", false).unwrap();
    state.set_animation(1, "b", false).unwrap();

    state.clear_tracks();
    assert_eq!(state.tracks_len(), 0);
    assert!(state.current(0).is_none());
}

#[test]
fn animation_time_respects_start_end_window() {
    let (mut state, _) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 2.0)]);
    let handle = state.set_animation(0, "a", false).unwrap();
    handle.set_animation_start(&mut state, 0.5);
    handle.set_animation_end(&mut state, 1.5);

    state.update(0.25);
    let entry = state.track_entry(handle).unwrap();
    assert_close(entry.animation_time(), 0.75);

    state.update(10.0);
    let entry = state.track_entry(handle).unwrap();
    assert_close(entry.animation_time(), 1.5);
}

struct ClearOnInterrupt {
    rows: Rc<RefCell<Vec<String>>>,
}

impl AnimationStateListener for ClearOnInterrupt {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    ) {
        let label = match event {
            AnimationStateEvent::Start => "start",
            AnimationStateEvent::Interrupt => "interrupt",
            AnimationStateEvent::End => "end",
            AnimationStateEvent::Dispose => "dispose",
            AnimationStateEvent::Complete => "complete",
            AnimationStateEvent::Event(_) => "event",
        };
        self.rows
            .borrow_mut()
            .push(format!("{}:{label}", entry.animation_name));
        if matches!(event, AnimationStateEvent::Interrupt) {
            state.clear_listener_notifications();
        }
    }
}

#[test]
fn clear_listener_notifications_drops_queued_callbacks() {
    let (mut state, mut skeleton) = fixture(vec![
        rotate_animation("a", &[(0.0, 90.0)], 1.0),
        rotate_animation("b", &[(0.0, 45.0)], 1.0),
    ]);
    let rows = Rc::new(RefCell::new(Vec::new()));
    state.set_listener(ClearOnInterrupt { rows: rows.clone() });

    state.set_animation(0, "a", false).unwrap();
    state.apply(&mut skeleton);
    state.set_animation(0, "b", false).unwrap();

    // The interrupt handler cleared the queue, so b's start never arrives.
    assert_eq!(*rows.borrow(), vec!["a:start", "a:interrupt"]);

    // The state itself is unaffected.
    state.update(0.5);
    state.apply(&mut skeleton);
    let entry = state.current(0).and_then(|h| state.track_entry(h)).unwrap();
    assert_eq!(entry.animation.name, "b");
}

#[test]
fn add_empty_animation_fades_out_as_the_animation_ends() {
    let (mut state, mut skeleton) = fixture(vec![rotate_animation("a", &[(0.0, 90.0)], 1.0)]);

    state.set_animation(0, "a", false).unwrap();
    state.apply(&mut skeleton);
    assert_close(skeleton.bones[0].rotation, 90.0);

    // With no explicit delay the fade lines up with the end of "a".
    let empty = state.add_empty_animation(0, 0.5, 0.0);
    assert_close(state.track_entry(empty).unwrap().delay, 0.5);

    state.update(0.5);
    state.apply(&mut skeleton);
    assert_close(skeleton.bones[0].rotation, 90.0);

    // The empty entry takes over half way through its fade.
    state.update(0.25);
    state.apply(&mut skeleton);
    assert_close(skeleton.bones[0].rotation, 45.0);

    state.update(0.25);
    state.apply(&mut skeleton);
    assert_close(skeleton.bones[0].rotation, 0.0);
}

#[test]
fn reverse_plays_the_animation_back_to_front() {
    let (mut state, mut skeleton) =
        fixture(vec![rotate_animation("a", &[(0.0, 0.0), (1.0, 90.0)], 1.0)]);
    let handle = state.set_animation(0, "a", false).unwrap();
    handle.set_reverse(&mut state, true);

    state.update(0.25);
    state.apply(&mut skeleton);
    // 0.25s in plays the pose from 0.75s.
    assert_close(skeleton.bones[0].rotation, 67.5);
}

#[test]
fn reverse_suppresses_keyed_events() {
    let (mut state, mut skeleton) = fixture(vec![event_animation("a", &[0.5], 1.0)]);
    let recorder = Recorder::default();
    state.set_listener(recorder.listener());
    let handle = state.set_animation(0, "a", false).unwrap();
    handle.set_reverse(&mut state, true);

    state.update(0.6);
    state.apply(&mut skeleton);
    assert_eq!(recorder.count("a:event at0.5"), 0);

    // Completion still comes through.
    state.update(0.5);
    state.apply(&mut skeleton);
    assert_eq!(recorder.count("a:event at0.5"), 0);
    assert_eq!(recorder.count("a:complete"), 1);
}
