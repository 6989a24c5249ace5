//! Track-based sequencing: layers animations on numbered tracks, crossfades
//! between entries on the same track, and queues lifecycle notifications.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock};

use crate::model::{Animation, Event, MixBlend, MixDirection, RotateTimeline, Timeline};
use crate::runtime::animation::{apply_rotate, apply_timeline, attachment_name_at, sample_rotate};
use crate::runtime::Skeleton;
use crate::{AttachmentTimeline, Error, SkeletonData};

const EMPTY_ANIMATION_INDEX: usize = usize::MAX;

// Attachment bookkeeping generations. Each apply pass advances
// `unkeyed_state` by 2; a slot touched by an attachment timeline this pass
// is marked CURRENT, an untouched one SETUP so its setup attachment can be
// restored at the end of the pass.
const UNKEYED_SETUP: i32 = 1;
const UNKEYED_CURRENT: i32 = 2;

static EMPTY_ANIMATION: OnceLock<Arc<Animation>> = OnceLock::new();

/// Zero-duration animation used by the empty-animation operations to mix a
/// track back to the setup pose.
fn empty_animation() -> Arc<Animation> {
    EMPTY_ANIMATION
        .get_or_init(|| Arc::new(Animation::new("<empty>", Vec::new(), 0.0)))
        .clone()
}

/// Per-timeline apply mode for a mixing-out entry, recomputed whenever the
/// set of mixing entries changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimelineMode {
    Subsequent,
    First,
    HoldSubsequent,
    HoldFirst,
    HoldMix,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct EntryId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct EntrySlot {
    generation: u32,
    entry: Option<TrackEntry>,
}

/// Crossfade durations between animation pairs, with a default for pairs
/// that have no explicit entry.
#[derive(Clone, Debug)]
pub struct AnimationStateData {
    pub skeleton_data: Arc<SkeletonData>,
    pub default_mix: f32,
    mixes: HashMap<(usize, usize), f32>,
}

impl AnimationStateData {
    pub fn new(skeleton_data: Arc<SkeletonData>) -> Self {
        Self {
            skeleton_data,
            default_mix: 0.0,
            mixes: HashMap::new(),
        }
    }

    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::InvalidValue {
                message: "mix duration must be finite and >= 0".to_string(),
            });
        }
        let Some((from_index, _)) = self.skeleton_data.animation(from) else {
            return Err(Error::UnknownAnimation {
                name: from.to_string(),
            });
        };
        let Some((to_index, _)) = self.skeleton_data.animation(to) else {
            return Err(Error::UnknownAnimation {
                name: to.to_string(),
            });
        };
        self.mixes.insert((from_index, to_index), duration);
        Ok(())
    }

    fn mix_duration(&self, from_index: usize, to_index: usize) -> f32 {
        self.mixes
            .get(&(from_index, to_index))
            .copied()
            .unwrap_or(self.default_mix)
    }
}

/// State of one animation playing (or queued, or mixing out) on a track.
pub struct TrackEntry {
    pub track_index: usize,
    /// Index into `SkeletonData::animations`, or `usize::MAX` for the
    /// empty animation.
    pub animation_index: usize,
    pub animation: Arc<Animation>,
    pub looped: bool,

    pub delay: f32,
    pub track_time: f32,
    pub track_end: f32,
    pub animation_start: f32,
    pub animation_end: f32,
    pub animation_last: f32,
    pub track_last: f32,
    pub next_animation_last: f32,
    pub next_track_last: f32,
    pub time_scale: f32,

    pub alpha: f32,
    pub interrupt_alpha: f32,
    pub total_alpha: f32,
    pub mix_blend: MixBlend,
    pub hold_previous: bool,
    /// Plays the animation back to front. Keyed events do not fire.
    pub reverse: bool,
    pub mix_time: f32,
    pub mix_duration: f32,
    pub event_threshold: f32,
    pub attachment_threshold: f32,
    pub draw_order_threshold: f32,

    mixing_from: Option<EntryId>,
    mixing_to: Option<EntryId>,
    listener: Option<Box<dyn TrackEntryListener>>,
    timeline_mode: Vec<TimelineMode>,
    timeline_hold_mix: Vec<Option<EntryId>>,
    timelines_rotation: Vec<f32>,
}

impl std::fmt::Debug for TrackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackEntry")
            .field("track_index", &self.track_index)
            .field("animation", &self.animation.name)
            .field("looped", &self.looped)
            .field("delay", &self.delay)
            .field("track_time", &self.track_time)
            .field("track_end", &self.track_end)
            .field("mix_time", &self.mix_time)
            .field("mix_duration", &self.mix_duration)
            .field("alpha", &self.alpha)
            .finish()
    }
}

impl TrackEntry {
    fn new(
        track_index: usize,
        animation_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        mix_duration: f32,
    ) -> Self {
        let animation_end = animation.duration;
        Self {
            track_index,
            animation_index,
            animation,
            looped,
            delay: 0.0,
            track_time: 0.0,
            track_end: f32::MAX,
            animation_start: 0.0,
            animation_end,
            animation_last: -1.0,
            track_last: -1.0,
            next_animation_last: -1.0,
            next_track_last: -1.0,
            time_scale: 1.0,
            alpha: 1.0,
            interrupt_alpha: 1.0,
            total_alpha: 0.0,
            mix_blend: MixBlend::Replace,
            hold_previous: false,
            reverse: false,
            mix_time: 0.0,
            mix_duration,
            event_threshold: 0.0,
            attachment_threshold: 0.0,
            draw_order_threshold: 0.0,
            mixing_from: None,
            mixing_to: None,
            listener: None,
            timeline_mode: Vec::new(),
            timeline_hold_mix: Vec::new(),
            timelines_rotation: Vec::new(),
        }
    }

    /// Current time within the animation, after looping and the
    /// start/end window.
    pub fn animation_time(&self) -> f32 {
        if self.looped {
            let duration = self.animation_end - self.animation_start;
            if duration == 0.0 {
                return self.animation_start;
            }
            self.track_time % duration + self.animation_start
        } else {
            (self.track_time + self.animation_start).min(self.animation_end)
        }
    }

    /// Track time at which the next loop iteration (or the animation, when
    /// not looping) completes.
    pub fn track_complete(&self) -> f32 {
        let duration = self.animation_end - self.animation_start;
        if duration != 0.0 {
            if self.looped {
                return duration * (1.0 + (self.track_time / duration).floor());
            }
            if self.track_time < duration {
                return duration;
            }
        }
        self.track_time
    }
}

/// Stable reference to a track entry. Entries are freed when disposed, so
/// every accessor checks liveness; setters on a disposed entry are no-ops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackEntryHandle {
    id: EntryId,
}

impl TrackEntryHandle {
    fn with_entry_mut(&self, state: &mut AnimationState, f: impl FnOnce(&mut TrackEntry)) {
        if let Some(entry) = state.entry_mut(self.id) {
            f(entry);
        }
    }

    pub fn set_listener<L: TrackEntryListener + 'static>(
        &self,
        state: &mut AnimationState,
        listener: L,
    ) {
        self.with_entry_mut(state, |entry| {
            entry.listener = Some(Box::new(listener));
        });
    }

    pub fn set_delay(&self, state: &mut AnimationState, delay: f32) {
        self.with_entry_mut(state, |entry| entry.delay = delay);
    }

    pub fn set_track_end(&self, state: &mut AnimationState, track_end: f32) {
        self.with_entry_mut(state, |entry| entry.track_end = track_end);
    }

    pub fn set_time_scale(&self, state: &mut AnimationState, time_scale: f32) {
        self.with_entry_mut(state, |entry| entry.time_scale = time_scale);
    }

    pub fn set_mix_duration(&self, state: &mut AnimationState, mix_duration: f32) {
        self.with_entry_mut(state, |entry| entry.mix_duration = mix_duration);
    }

    pub fn set_mix_blend(&self, state: &mut AnimationState, mix_blend: MixBlend) {
        self.with_entry_mut(state, |entry| entry.mix_blend = mix_blend);
    }

    pub fn set_hold_previous(&self, state: &mut AnimationState, hold_previous: bool) {
        self.with_entry_mut(state, |entry| entry.hold_previous = hold_previous);
    }

    pub fn set_reverse(&self, state: &mut AnimationState, reverse: bool) {
        self.with_entry_mut(state, |entry| entry.reverse = reverse);
    }

    pub fn set_alpha(&self, state: &mut AnimationState, alpha: f32) {
        self.with_entry_mut(state, |entry| entry.alpha = alpha);
    }

    pub fn set_event_threshold(&self, state: &mut AnimationState, threshold: f32) {
        self.with_entry_mut(state, |entry| entry.event_threshold = threshold);
    }

    pub fn set_attachment_threshold(&self, state: &mut AnimationState, threshold: f32) {
        self.with_entry_mut(state, |entry| entry.attachment_threshold = threshold);
    }

    pub fn set_draw_order_threshold(&self, state: &mut AnimationState, threshold: f32) {
        self.with_entry_mut(state, |entry| entry.draw_order_threshold = threshold);
    }

    pub fn set_animation_start(&self, state: &mut AnimationState, animation_start: f32) {
        self.with_entry_mut(state, |entry| entry.animation_start = animation_start);
    }

    pub fn set_animation_end(&self, state: &mut AnimationState, animation_end: f32) {
        self.with_entry_mut(state, |entry| entry.animation_end = animation_end);
    }

    /// Forgets accumulated rotation mixing directions, so the next apply
    /// rotates each bone the shortest way.
    pub fn reset_rotation_directions(&self, state: &mut AnimationState) {
        self.with_entry_mut(state, |entry| entry.timelines_rotation.clear());
    }
}

/// Copy of the identifying fields of a track entry, passed to listeners so
/// the state itself stays mutable during the callback.
#[derive(Clone, Debug)]
pub struct TrackEntrySnapshot {
    pub track_index: usize,
    /// `-1` for the empty animation, `-2` for an already-disposed entry.
    pub animation_index: i32,
    pub animation_name: String,
    pub track_time: f32,
}

#[derive(Clone, Debug)]
pub enum AnimationStateEvent {
    Start,
    Interrupt,
    End,
    Dispose,
    Complete,
    Event(Event),
}

pub trait TrackEntryListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    );
}

pub trait AnimationStateListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    );
}

#[derive(Clone, Debug)]
struct QueuedEvent {
    entry: EntryId,
    event: AnimationStateEvent,
}

#[derive(Default)]
struct Track {
    current: Option<EntryId>,
    queue: VecDeque<EntryId>,
}

/// Applies animations over time, layering tracks and mixing between
/// entries on each track.
pub struct AnimationState {
    data: AnimationStateData,
    pub time_scale: f32,
    tracks: Vec<Track>,
    entries: Vec<EntrySlot>,
    free_list: Vec<usize>,
    event_queue: VecDeque<QueuedEvent>,
    events: Vec<Event>,
    listener: Option<Box<dyn AnimationStateListener>>,
    draining: bool,
    drain_disabled: bool,
    animations_changed: bool,
    property_ids: HashSet<u64>,
    unkeyed_state: i32,
}

impl AnimationState {
    pub fn new(data: AnimationStateData) -> Self {
        Self {
            data,
            time_scale: 1.0,
            tracks: Vec::new(),
            entries: Vec::new(),
            free_list: Vec::new(),
            event_queue: VecDeque::new(),
            events: Vec::new(),
            listener: None,
            draining: false,
            drain_disabled: false,
            animations_changed: false,
            property_ids: HashSet::new(),
            unkeyed_state: 0,
        }
    }

    pub fn data(&self) -> &AnimationStateData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AnimationStateData {
        &mut self.data
    }

    pub fn set_listener<L: AnimationStateListener + 'static>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
    }

    pub fn tracks_len(&self) -> usize {
        self.tracks.len()
    }

    /// Handle to the entry currently playing on a track.
    pub fn current(&self, track_index: usize) -> Option<TrackEntryHandle> {
        self.tracks
            .get(track_index)?
            .current
            .map(|id| TrackEntryHandle { id })
    }

    pub fn track_entry(&self, handle: TrackEntryHandle) -> Option<&TrackEntry> {
        self.entry(handle.id)
    }

    pub fn with_track_entry<F: FnOnce(&TrackEntry) -> R, R>(
        &self,
        track_index: usize,
        f: F,
    ) -> Option<R> {
        let id = self.tracks.get(track_index)?.current?;
        self.entry(id).map(f)
    }

    /// Discards queued but not yet delivered listener notifications.
    pub fn clear_listener_notifications(&mut self) {
        // Pending Dispose items still free their entries; only the
        // notifications are dropped.
        while let Some(queued) = self.event_queue.pop_front() {
            if matches!(queued.event, AnimationStateEvent::Dispose) {
                self.free_entry(queued.entry);
            }
        }
    }

    // Entry arena.

    fn alloc_entry(&mut self, entry: TrackEntry) -> EntryId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.entries[index];
            slot.entry = Some(entry);
            EntryId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.entries.len();
            self.entries.push(EntrySlot {
                generation: 0,
                entry: Some(entry),
            });
            EntryId {
                index,
                generation: 0,
            }
        }
    }

    fn entry(&self, id: EntryId) -> Option<&TrackEntry> {
        let slot = self.entries.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut TrackEntry> {
        let slot = self.entries.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn free_entry(&mut self, id: EntryId) {
        let Some(slot) = self.entries.get_mut(id.index) else {
            return;
        };
        if slot.generation != id.generation {
            return;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
    }

    fn ensure_track(&mut self, track_index: usize) {
        if track_index >= self.tracks.len() {
            self.tracks.resize_with(track_index + 1, Track::default);
        }
    }

    // Time advancement.

    /// Advances every track's clock, promotes queued entries whose delay
    /// has elapsed, and ends finished mixes and tracks.
    pub fn update(&mut self, delta: f32) {
        if !delta.is_finite() {
            return;
        }
        let delta = delta * self.time_scale;
        let mut pending = VecDeque::new();

        for track_index in 0..self.tracks.len() {
            let Some(current_id) = self.tracks[track_index].current else {
                continue;
            };

            let (current_delta, has_mixing_from, track_last, track_end, current_time_scale) = {
                let Some(current) = self.entry_mut(current_id) else {
                    self.tracks[track_index].current = None;
                    continue;
                };
                current.animation_last = current.next_animation_last;
                current.track_last = current.next_track_last;

                let mut current_delta = delta * current.time_scale;
                if current.delay > 0.0 {
                    current.delay -= current_delta;
                    if current.delay > 0.0 {
                        continue;
                    }
                    current_delta = -current.delay;
                    current.delay = 0.0;
                }
                (
                    current_delta,
                    current.mixing_from.is_some(),
                    current.track_last,
                    current.track_end,
                    current.time_scale,
                )
            };

            if let Some(&next_id) = self.tracks[track_index].queue.front() {
                let next_delay = self.entry(next_id).map(|next| next.delay).unwrap_or(0.0);
                let next_time = track_last - next_delay;
                if next_time >= 0.0 {
                    self.tracks[track_index].queue.pop_front();
                    if let Some(next) = self.entry_mut(next_id) {
                        next.delay = 0.0;
                        // Carry over the time the previous entry ran past the
                        // handoff point.
                        if current_time_scale != 0.0 {
                            next.track_time +=
                                (next_time / current_time_scale + delta) * next.time_scale;
                        }
                    }
                    if let Some(current) = self.entry_mut(current_id) {
                        current.track_time += current_delta;
                    }
                    self.set_current(track_index, next_id, true, &mut pending);
                    let mut id = next_id;
                    while let Some(from) = self.entry(id).and_then(|e| e.mixing_from) {
                        if let Some(entry) = self.entry_mut(id) {
                            entry.mix_time += delta;
                        }
                        id = from;
                    }
                    continue;
                }
            } else if !has_mixing_from && track_last >= track_end {
                // Nothing queued and the track end was reached.
                self.tracks[track_index].current = None;
                push_event(&mut pending, current_id, AnimationStateEvent::End);
                push_event(&mut pending, current_id, AnimationStateEvent::Dispose);
                self.animations_changed = true;
                continue;
            }

            if has_mixing_from && self.update_mixing_from(current_id, delta, &mut pending) {
                // All mixing-from entries finished; dispose the chain.
                let mut from = self
                    .entry_mut(current_id)
                    .and_then(|current| current.mixing_from.take());
                if let Some(from_id) = from {
                    if let Some(entry) = self.entry_mut(from_id) {
                        entry.mixing_to = None;
                    }
                }
                while let Some(from_id) = from {
                    push_event(&mut pending, from_id, AnimationStateEvent::End);
                    push_event(&mut pending, from_id, AnimationStateEvent::Dispose);
                    self.animations_changed = true;
                    from = self.entry(from_id).and_then(|e| e.mixing_from);
                }
            }

            if let Some(current) = self.entry_mut(current_id) {
                current.track_time += current_delta;
            }
        }

        self.event_queue.append(&mut pending);
        self.drain_event_queue();
    }

    /// Returns true once all mixing-from entries of `to` have finished.
    fn update_mixing_from(
        &mut self,
        to_id: EntryId,
        delta: f32,
        out: &mut VecDeque<QueuedEvent>,
    ) -> bool {
        let Some(from_id) = self.entry(to_id).and_then(|to| to.mixing_from) else {
            return true;
        };

        let finished = self.update_mixing_from(from_id, delta, out);

        if let Some(from) = self.entry_mut(from_id) {
            from.animation_last = from.next_animation_last;
            from.track_last = from.next_track_last;
        }

        let (to_mix_time, to_mix_duration) = self
            .entry(to_id)
            .map(|to| (to.mix_time, to.mix_duration))
            .unwrap_or((0.0, 0.0));

        // mix_time > 0 ensures the mixing-from entry was applied at least
        // once before it can be removed.
        if to_mix_time > 0.0 && to_mix_time >= to_mix_duration {
            let from_total_alpha = self.entry(from_id).map(|e| e.total_alpha).unwrap_or(0.0);
            if from_total_alpha == 0.0 || to_mix_duration == 0.0 {
                let next_from = self.entry(from_id).and_then(|from| from.mixing_from);
                let from_interrupt_alpha = self
                    .entry(from_id)
                    .map(|e| e.interrupt_alpha)
                    .unwrap_or(1.0);
                if let Some(to) = self.entry_mut(to_id) {
                    to.mixing_from = next_from;
                    to.interrupt_alpha = from_interrupt_alpha;
                }
                if let Some(next_from) = next_from {
                    if let Some(entry) = self.entry_mut(next_from) {
                        entry.mixing_to = Some(to_id);
                    }
                }
                push_event(out, from_id, AnimationStateEvent::End);
                push_event(out, from_id, AnimationStateEvent::Dispose);
                self.animations_changed = true;
            }
            return finished;
        }

        if let Some(from) = self.entry_mut(from_id) {
            from.track_time += delta * from.time_scale;
        }
        if let Some(to) = self.entry_mut(to_id) {
            to.mix_time += delta;
        }
        false
    }

    // Pose application.

    /// Poses the skeleton from every track, bottom track first. Returns
    /// whether any entry was applied.
    pub fn apply(&mut self, skeleton: &mut Skeleton) -> bool {
        if self.animations_changed {
            self.rebuild_timeline_modes();
        }

        let mut pending = VecDeque::new();
        let mut applied = false;

        let current_ids = self
            .tracks
            .iter()
            .filter_map(|track| track.current)
            .collect::<Vec<_>>();
        for current_id in current_ids {
            let (track_index, delay) = match self.entry(current_id) {
                Some(entry) => (entry.track_index, entry.delay),
                None => continue,
            };
            if delay > 0.0 {
                continue;
            }
            applied = true;

            // The bottom track fades out toward the current pose rather
            // than snapping before the first frame.
            let blend = if track_index == 0 {
                MixBlend::First
            } else {
                self.entry(current_id)
                    .map(|e| e.mix_blend)
                    .unwrap_or(MixBlend::Replace)
            };

            let mut alpha = self.entry(current_id).map(|e| e.alpha).unwrap_or(1.0);
            if self.entry(current_id).and_then(|e| e.mixing_from).is_some() {
                alpha *= self.apply_mixing_from(current_id, skeleton, blend, &mut pending);
            } else {
                let past_end = self
                    .entry(current_id)
                    .is_some_and(|e| e.track_time >= e.track_end)
                    && self.tracks[track_index].queue.is_empty();
                if past_end {
                    alpha = 0.0;
                }
            }

            let (animation, animation_last, animation_time, reverse) = match self.entry(current_id)
            {
                Some(e) => (
                    e.animation.clone(),
                    e.animation_last,
                    e.animation_time(),
                    e.reverse,
                ),
                None => continue,
            };
            let apply_time = if reverse {
                animation.duration - animation_time
            } else {
                animation_time
            };

            let mut events = std::mem::take(&mut self.events);
            events.clear();

            if (track_index == 0 && alpha == 1.0) || blend == MixBlend::Add {
                for timeline in &animation.timelines {
                    match timeline {
                        Timeline::Attachment(t) => {
                            self.apply_attachment_timeline(t, skeleton, apply_time, blend, true);
                        }
                        _ => apply_timeline(
                            timeline,
                            skeleton,
                            animation_last,
                            apply_time,
                            (!reverse).then_some(&mut events),
                            alpha,
                            blend,
                            MixDirection::In,
                        ),
                    }
                }
            } else {
                let timeline_mode = self
                    .entry(current_id)
                    .map(|e| e.timeline_mode.clone())
                    .unwrap_or_default();
                let (mut rotation, first_frame) =
                    self.take_rotation_buffer(current_id, animation.timelines.len());

                for (i, timeline) in animation.timelines.iter().enumerate() {
                    let timeline_blend =
                        if matches!(timeline_mode.get(i), Some(TimelineMode::Subsequent)) {
                            blend
                        } else {
                            MixBlend::Setup
                        };
                    match timeline {
                        Timeline::Rotate(t) => apply_rotate_mixed(
                            t,
                            skeleton,
                            apply_time,
                            alpha,
                            timeline_blend,
                            &mut rotation,
                            i << 1,
                            first_frame,
                        ),
                        Timeline::Attachment(t) => self.apply_attachment_timeline(
                            t,
                            skeleton,
                            apply_time,
                            timeline_blend,
                            true,
                        ),
                        _ => apply_timeline(
                            timeline,
                            skeleton,
                            animation_last,
                            apply_time,
                            (!reverse).then_some(&mut events),
                            alpha,
                            timeline_blend,
                            MixDirection::In,
                        ),
                    }
                }
                self.restore_rotation_buffer(current_id, rotation);
            }

            self.queue_events(current_id, animation_time, &mut events, &mut pending);
            self.events = events;
            if let Some(entry) = self.entry_mut(current_id) {
                entry.next_animation_last = animation_time;
                entry.next_track_last = entry.track_time;
            }
        }

        // Restore the setup attachment on slots no attachment timeline
        // touched this pass.
        let setup_state = self.unkeyed_state + UNKEYED_SETUP;
        for (i, slot) in skeleton.slots.iter_mut().enumerate() {
            if slot.attachment_state == setup_state {
                let setup = skeleton.data.slots.get(i).and_then(|s| s.attachment.clone());
                slot.set_attachment(setup.as_deref());
            }
        }
        self.unkeyed_state = self.unkeyed_state.wrapping_add(2);

        self.event_queue.append(&mut pending);
        self.drain_event_queue();
        applied
    }

    /// Applies the mixing-from chain of `to`, innermost first, and returns
    /// the mix percentage `to` should be applied with.
    fn apply_mixing_from(
        &mut self,
        to_id: EntryId,
        skeleton: &mut Skeleton,
        blend: MixBlend,
        out: &mut VecDeque<QueuedEvent>,
    ) -> f32 {
        let Some(from_id) = self.entry(to_id).and_then(|to| to.mixing_from) else {
            return 1.0;
        };

        if self
            .entry(from_id)
            .and_then(|from| from.mixing_from)
            .is_some()
        {
            self.apply_mixing_from(from_id, skeleton, blend, out);
        }

        let (mix_time, mix_duration, interrupt_alpha) = self
            .entry(to_id)
            .map(|to| (to.mix_time, to.mix_duration, to.interrupt_alpha))
            .unwrap_or((0.0, 0.0, 1.0));

        let (
            from_animation,
            from_animation_last,
            from_animation_time,
            from_alpha,
            from_mix_blend,
            from_reverse,
        ) = match self.entry(from_id) {
            Some(from) => (
                from.animation.clone(),
                from.animation_last,
                from.animation_time(),
                from.alpha,
                from.mix_blend,
                from.reverse,
            ),
            None => return 1.0,
        };
        let from_apply_time = if from_reverse {
            from_animation.duration - from_animation_time
        } else {
            from_animation_time
        };
        let (event_threshold, attachment_threshold, draw_order_threshold) = self
            .entry(from_id)
            .map(|from| {
                (
                    from.event_threshold,
                    from.attachment_threshold,
                    from.draw_order_threshold,
                )
            })
            .unwrap_or((0.0, 0.0, 0.0));

        let mut from_blend = blend;
        let mix = if mix_duration == 0.0 {
            // A zero-length mix removes the entry this pass; apply it as a
            // dip to setup instead of a crossfade.
            if from_blend == MixBlend::First {
                from_blend = MixBlend::Setup;
            }
            1.0
        } else {
            let m = (mix_time / mix_duration).min(1.0);
            if from_blend != MixBlend::First {
                from_blend = from_mix_blend;
            }
            m
        };

        let collect_events = !from_reverse && mix < event_threshold;
        let attachments = mix < attachment_threshold;
        let draw_order = mix < draw_order_threshold;
        let alpha_hold = from_alpha * interrupt_alpha;
        let alpha_mix = alpha_hold * (1.0 - mix);

        let mut events = std::mem::take(&mut self.events);
        events.clear();

        if from_blend == MixBlend::Add {
            for timeline in &from_animation.timelines {
                apply_timeline(
                    timeline,
                    skeleton,
                    from_animation_last,
                    from_apply_time,
                    collect_events.then_some(&mut events),
                    alpha_mix,
                    from_blend,
                    MixDirection::Out,
                );
            }
        } else {
            let (timeline_mode, timeline_hold_mix) = match self.entry(from_id) {
                Some(from) => (from.timeline_mode.clone(), from.timeline_hold_mix.clone()),
                None => (Vec::new(), Vec::new()),
            };
            let (mut rotation, first_frame) =
                self.take_rotation_buffer(from_id, from_animation.timelines.len());

            let mut total_alpha = 0.0f32;
            for (i, timeline) in from_animation.timelines.iter().enumerate() {
                let mode = timeline_mode.get(i).copied().unwrap_or(TimelineMode::First);
                let (timeline_blend, alpha) = match mode {
                    TimelineMode::Subsequent => {
                        if !draw_order && matches!(timeline, Timeline::DrawOrder(_)) {
                            continue;
                        }
                        (from_blend, alpha_mix)
                    }
                    TimelineMode::First => (MixBlend::Setup, alpha_mix),
                    TimelineMode::HoldSubsequent => (from_blend, alpha_hold),
                    TimelineMode::HoldFirst => (MixBlend::Setup, alpha_hold),
                    TimelineMode::HoldMix => {
                        // Fade this timeline out over the hold entry's mix
                        // instead of this entry's.
                        let factor = timeline_hold_mix
                            .get(i)
                            .copied()
                            .flatten()
                            .and_then(|hold| self.entry(hold))
                            .map(|hold| {
                                if hold.mix_duration > 0.0 {
                                    (1.0 - hold.mix_time / hold.mix_duration).max(0.0)
                                } else {
                                    0.0
                                }
                            })
                            .unwrap_or(0.0);
                        (MixBlend::Setup, alpha_hold * factor)
                    }
                };
                total_alpha += alpha;

                match timeline {
                    Timeline::Rotate(t) => apply_rotate_mixed(
                        t,
                        skeleton,
                        from_apply_time,
                        alpha,
                        timeline_blend,
                        &mut rotation,
                        i << 1,
                        first_frame,
                    ),
                    Timeline::Attachment(t) => self.apply_attachment_timeline(
                        t,
                        skeleton,
                        from_apply_time,
                        timeline_blend,
                        attachments,
                    ),
                    _ => {
                        let direction = if draw_order
                            && matches!(timeline, Timeline::DrawOrder(_))
                            && timeline_blend == MixBlend::Setup
                        {
                            MixDirection::In
                        } else {
                            MixDirection::Out
                        };
                        apply_timeline(
                            timeline,
                            skeleton,
                            from_animation_last,
                            from_apply_time,
                            collect_events.then_some(&mut events),
                            alpha,
                            timeline_blend,
                            direction,
                        );
                    }
                }
            }
            self.restore_rotation_buffer(from_id, rotation);
            if let Some(from) = self.entry_mut(from_id) {
                from.total_alpha = total_alpha;
            }
        }

        if mix_duration > 0.0 {
            self.queue_events(from_id, from_animation_time, &mut events, out);
        } else {
            events.clear();
        }
        self.events = events;
        if let Some(from) = self.entry_mut(from_id) {
            from.next_animation_last = from_animation_time;
            from.next_track_last = from.track_time;
        }

        mix
    }

    fn take_rotation_buffer(&mut self, entry_id: EntryId, timeline_count: usize) -> (Vec<f32>, bool) {
        match self.entry_mut(entry_id) {
            Some(entry) => {
                let expected = timeline_count << 1;
                let first_frame = entry.timelines_rotation.len() != expected;
                if first_frame {
                    entry.timelines_rotation.clear();
                    entry.timelines_rotation.resize(expected, 0.0);
                }
                (std::mem::take(&mut entry.timelines_rotation), first_frame)
            }
            None => (vec![0.0; timeline_count << 1], true),
        }
    }

    fn restore_rotation_buffer(&mut self, entry_id: EntryId, rotation: Vec<f32>) {
        if let Some(entry) = self.entry_mut(entry_id) {
            entry.timelines_rotation = rotation;
        }
    }

    fn apply_attachment_timeline(
        &mut self,
        timeline: &AttachmentTimeline,
        skeleton: &mut Skeleton,
        time: f32,
        blend: MixBlend,
        attachments: bool,
    ) {
        if timeline.frames.is_empty() {
            return;
        }
        let slot_index = timeline.slot_index;
        let active = skeleton
            .slots
            .get(slot_index)
            .and_then(|slot| skeleton.bones.get(slot.bone))
            .is_some_and(|bone| bone.active);
        if !active {
            return;
        }

        if time < timeline.frames[0].time {
            if blend == MixBlend::Setup || blend == MixBlend::First {
                let setup = skeleton
                    .data
                    .slots
                    .get(slot_index)
                    .and_then(|s| s.attachment.clone());
                self.set_slot_attachment(skeleton, slot_index, setup.as_deref(), attachments);
            }
        } else {
            let name = attachment_name_at(timeline, time).map(str::to_string);
            self.set_slot_attachment(skeleton, slot_index, name.as_deref(), attachments);
        }

        // Keep the slot out of the end-of-apply setup restore.
        if let Some(slot) = skeleton.slots.get_mut(slot_index) {
            if slot.attachment_state <= self.unkeyed_state {
                slot.attachment_state = self.unkeyed_state + UNKEYED_SETUP;
            }
        }
    }

    fn set_slot_attachment(
        &self,
        skeleton: &mut Skeleton,
        slot_index: usize,
        name: Option<&str>,
        attachments: bool,
    ) {
        if let Some(slot) = skeleton.slots.get_mut(slot_index) {
            slot.set_attachment(name);
            if attachments {
                slot.attachment_state = self.unkeyed_state + UNKEYED_CURRENT;
            }
        }
    }

    /// Queues fired events and Complete in playback order: events keyed
    /// before the loop boundary, then Complete, then events after it.
    fn queue_events(
        &mut self,
        entry_id: EntryId,
        animation_time: f32,
        events: &mut Vec<Event>,
        out: &mut VecDeque<QueuedEvent>,
    ) {
        let Some(entry) = self.entry(entry_id) else {
            events.clear();
            return;
        };
        let animation_start = entry.animation_start;
        let animation_end = entry.animation_end;
        let duration = animation_end - animation_start;
        let track_last_wrapped = if duration == 0.0 {
            0.0
        } else {
            entry.track_last % duration
        };

        let mut i = 0;
        while i < events.len() {
            let event = &events[i];
            if event.time < track_last_wrapped {
                break;
            }
            i += 1;
            if event.time > animation_end {
                continue;
            }
            push_event(out, entry_id, AnimationStateEvent::Event(event.clone()));
        }

        let complete = if entry.looped {
            duration == 0.0 || track_last_wrapped > entry.track_time % duration
        } else {
            animation_time >= animation_end && entry.animation_last < animation_end
        };
        if complete {
            push_event(out, entry_id, AnimationStateEvent::Complete);
        }

        while i < events.len() {
            let event = &events[i];
            i += 1;
            if event.time < animation_start {
                continue;
            }
            push_event(out, entry_id, AnimationStateEvent::Event(event.clone()));
        }
        events.clear();
    }

    // Track control.

    /// Plays an animation on a track, crossfading from whatever the track
    /// was showing.
    pub fn set_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
    ) -> Result<TrackEntryHandle, Error> {
        let (animation_index, animation) = self
            .data
            .skeleton_data
            .animation(animation_name)
            .map(|(i, a)| (i, a.clone()))
            .ok_or_else(|| Error::UnknownAnimation {
                name: animation_name.to_string(),
            })?;
        Ok(self.set_animation_with(track_index, animation_index, animation, looped))
    }

    fn set_animation_with(
        &mut self,
        track_index: usize,
        animation_index: usize,
        animation: Arc<Animation>,
        looped: bool,
    ) -> TrackEntryHandle {
        self.ensure_track(track_index);
        let mut interrupt = true;
        let mut current = self.tracks[track_index].current;
        if let Some(current_id) = current {
            let never_applied = self
                .entry(current_id)
                .is_some_and(|e| e.next_track_last == -1.0);
            if never_applied {
                // Replace an entry that was set but never applied; mix from
                // what it was mixing from, if anything.
                let mixing_from = self.entry(current_id).and_then(|e| e.mixing_from);
                self.tracks[track_index].current = mixing_from;
                push_event(
                    &mut self.event_queue,
                    current_id,
                    AnimationStateEvent::Interrupt,
                );
                push_event(&mut self.event_queue, current_id, AnimationStateEvent::End);
                push_event(
                    &mut self.event_queue,
                    current_id,
                    AnimationStateEvent::Dispose,
                );
                self.clear_next(track_index);
                current = mixing_from;
                interrupt = false;
            } else {
                self.clear_next(track_index);
            }
        }

        let mix_duration = match current.and_then(|id| self.entry(id)) {
            Some(last) => self.data.mix_duration(last.animation_index, animation_index),
            None => 0.0,
        };
        let entry_id = self.alloc_entry(TrackEntry::new(
            track_index,
            animation_index,
            animation,
            looped,
            mix_duration,
        ));
        let mut pending = VecDeque::new();
        self.set_current(track_index, entry_id, interrupt, &mut pending);
        self.event_queue.append(&mut pending);
        self.drain_event_queue();
        TrackEntryHandle { id: entry_id }
    }

    /// Queues an animation after the last entry on a track. A non-positive
    /// delay schedules it so the crossfade ends when the previous entry
    /// completes.
    pub fn add_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        let (animation_index, animation) = self
            .data
            .skeleton_data
            .animation(animation_name)
            .map(|(i, a)| (i, a.clone()))
            .ok_or_else(|| Error::UnknownAnimation {
                name: animation_name.to_string(),
            })?;
        Ok(self.add_animation_with(track_index, animation_index, animation, looped, delay))
    }

    fn add_animation_with(
        &mut self,
        track_index: usize,
        animation_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        delay: f32,
    ) -> TrackEntryHandle {
        self.ensure_track(track_index);
        let last = {
            let track = &self.tracks[track_index];
            track.queue.back().copied().or(track.current)
        };

        let mix_duration = match last.and_then(|id| self.entry(id)) {
            Some(last) => self.data.mix_duration(last.animation_index, animation_index),
            None => 0.0,
        };
        let entry_id = self.alloc_entry(TrackEntry::new(
            track_index,
            animation_index,
            animation,
            looped,
            mix_duration,
        ));

        let mut delay = delay;
        match last {
            None => {
                let mut pending = VecDeque::new();
                self.set_current(track_index, entry_id, true, &mut pending);
                self.event_queue.append(&mut pending);
                self.drain_event_queue();
            }
            Some(last_id) => {
                if delay <= 0.0 {
                    let last_complete = self
                        .entry(last_id)
                        .map(|e| e.track_complete())
                        .unwrap_or(0.0);
                    delay += last_complete - mix_duration;
                }
                self.tracks[track_index].queue.push_back(entry_id);
            }
        }
        if let Some(entry) = self.entry_mut(entry_id) {
            entry.delay = delay;
        }
        TrackEntryHandle { id: entry_id }
    }

    /// Mixes the track out to the setup pose over `mix_duration`, then
    /// clears it.
    pub fn set_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
    ) -> TrackEntryHandle {
        let handle = self.set_animation_with(
            track_index,
            EMPTY_ANIMATION_INDEX,
            empty_animation(),
            false,
        );
        handle.set_mix_duration(self, mix_duration);
        handle.set_track_end(self, mix_duration);
        handle
    }

    pub fn add_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
        delay: f32,
    ) -> TrackEntryHandle {
        let handle = self.add_animation_with(
            track_index,
            EMPTY_ANIMATION_INDEX,
            empty_animation(),
            false,
            delay,
        );
        if delay <= 0.0 {
            // Line the fade up so it ends when the previous entry does.
            self.with_entry_mut_id(handle.id, |entry| {
                entry.delay += entry.mix_duration - mix_duration;
            });
        }
        handle.set_mix_duration(self, mix_duration);
        handle.set_track_end(self, mix_duration);
        handle
    }

    /// Mixes every non-empty track out to the setup pose.
    pub fn set_empty_animations(&mut self, mix_duration: f32) {
        let was_disabled = self.drain_disabled;
        self.drain_disabled = true;
        for track_index in 0..self.tracks.len() {
            if self.tracks[track_index].current.is_some() {
                self.set_empty_animation(track_index, mix_duration);
            }
        }
        self.drain_disabled = was_disabled;
        self.drain_event_queue();
    }

    fn with_entry_mut_id(&mut self, id: EntryId, f: impl FnOnce(&mut TrackEntry)) {
        if let Some(entry) = self.entry_mut(id) {
            f(entry);
        }
    }

    /// Removes all entries from a track without any mixing out.
    pub fn clear_track(&mut self, track_index: usize) {
        self.clear_track_internal(track_index);
        self.drain_event_queue();
    }

    pub fn clear_tracks(&mut self) {
        let was_disabled = self.drain_disabled;
        self.drain_disabled = true;
        for track_index in 0..self.tracks.len() {
            self.clear_track_internal(track_index);
        }
        self.tracks.clear();
        self.drain_disabled = was_disabled;
        self.drain_event_queue();
    }

    fn clear_track_internal(&mut self, track_index: usize) {
        if track_index >= self.tracks.len() {
            return;
        }
        let Some(current_id) = self.tracks[track_index].current else {
            self.clear_next(track_index);
            return;
        };

        push_event(&mut self.event_queue, current_id, AnimationStateEvent::End);
        push_event(
            &mut self.event_queue,
            current_id,
            AnimationStateEvent::Dispose,
        );
        self.clear_next(track_index);

        let mut entry_id = current_id;
        loop {
            let from = self.entry_mut(entry_id).and_then(|entry| {
                let from = entry.mixing_from.take();
                entry.mixing_to = None;
                from
            });
            let Some(from_id) = from else {
                break;
            };
            push_event(&mut self.event_queue, from_id, AnimationStateEvent::End);
            push_event(
                &mut self.event_queue,
                from_id,
                AnimationStateEvent::Dispose,
            );
            entry_id = from_id;
        }

        self.tracks[track_index].current = None;
        self.animations_changed = true;
    }

    /// Disposes entries queued after the current one.
    fn clear_next(&mut self, track_index: usize) {
        let queued = self.tracks[track_index]
            .queue
            .drain(..)
            .collect::<Vec<_>>();
        for entry_id in queued {
            push_event(&mut self.event_queue, entry_id, AnimationStateEvent::Dispose);
        }
    }

    fn set_current(
        &mut self,
        track_index: usize,
        entry_id: EntryId,
        interrupt: bool,
        out: &mut VecDeque<QueuedEvent>,
    ) {
        let from = self.tracks[track_index].current.replace(entry_id);
        if let Some(from_id) = from {
            if interrupt {
                push_event(out, from_id, AnimationStateEvent::Interrupt);
            }
            // Carry the interrupted mix percentage so a rapid series of
            // interrupts fades out smoothly.
            let interrupt_alpha_mul = self
                .entry(from_id)
                .filter(|from| from.mixing_from.is_some() && from.mix_duration > 0.0)
                .map(|from| (from.mix_time / from.mix_duration).min(1.0))
                .unwrap_or(1.0);
            if let Some(entry) = self.entry_mut(entry_id) {
                entry.mixing_from = Some(from_id);
                entry.mix_time = 0.0;
                entry.interrupt_alpha *= interrupt_alpha_mul;
            }
            if let Some(from) = self.entry_mut(from_id) {
                from.mixing_to = Some(entry_id);
                from.timelines_rotation.clear();
            }
        }
        push_event(out, entry_id, AnimationStateEvent::Start);
        self.animations_changed = true;
    }

    // Timeline mode computation.

    fn add_property_ids(&mut self, ids: &[u64]) -> bool {
        let mut all_new = true;
        for id in ids {
            if !self.property_ids.insert(*id) {
                all_new = false;
            }
        }
        all_new
    }

    /// Recomputes per-timeline modes for every mixing chain. Walks each
    /// chain from the oldest mixing-from entry toward the newest so
    /// property ownership resolves in apply order.
    fn rebuild_timeline_modes(&mut self) {
        self.animations_changed = false;
        self.property_ids.clear();

        let current_ids = self
            .tracks
            .iter()
            .filter_map(|track| track.current)
            .collect::<Vec<_>>();
        for mut entry_id in current_ids {
            while let Some(from) = self.entry(entry_id).and_then(|e| e.mixing_from) {
                entry_id = from;
            }
            let mut cursor = Some(entry_id);
            while let Some(id) = cursor {
                let compute = self
                    .entry(id)
                    .is_some_and(|e| e.mixing_to.is_none() || e.mix_blend != MixBlend::Add);
                if compute {
                    self.compute_hold(id);
                }
                cursor = self.entry(id).and_then(|e| e.mixing_to);
            }
        }
    }

    fn compute_hold(&mut self, entry_id: EntryId) {
        let Some(entry) = self.entry(entry_id) else {
            return;
        };
        let animation = entry.animation.clone();
        let to_id = entry.mixing_to;
        let hold_previous = to_id
            .and_then(|to| self.entry(to))
            .map(|to| to.hold_previous)
            .unwrap_or(false);

        let count = animation.timelines.len();
        let mut timeline_mode = vec![TimelineMode::First; count];
        let mut timeline_hold_mix: Vec<Option<EntryId>> = vec![None; count];
        let mut ids = Vec::new();

        if to_id.is_some() && hold_previous {
            // The mixing-to entry holds this one at full alpha, so nothing
            // here fades; only first-vs-subsequent matters.
            for (i, timeline) in animation.timelines.iter().enumerate() {
                ids.clear();
                timeline.property_ids(&mut ids);
                timeline_mode[i] = if self.add_property_ids(&ids) {
                    TimelineMode::HoldFirst
                } else {
                    TimelineMode::HoldSubsequent
                };
            }
        } else {
            'timelines: for (i, timeline) in animation.timelines.iter().enumerate() {
                ids.clear();
                timeline.property_ids(&mut ids);
                if !self.add_property_ids(&ids) {
                    timeline_mode[i] = TimelineMode::Subsequent;
                    continue;
                }

                let instant = matches!(
                    timeline,
                    Timeline::Attachment(_) | Timeline::DrawOrder(_)
                );
                let to_keys_property = to_id
                    .and_then(|to| self.entry(to))
                    .is_some_and(|to| to.animation.has_timeline(&ids));
                let Some(to_id) = to_id else {
                    timeline_mode[i] = TimelineMode::First;
                    continue;
                };
                if instant || !to_keys_property {
                    timeline_mode[i] = TimelineMode::First;
                    continue;
                }

                // The property is keyed by the entry mixing in. If a later
                // entry in the chain stops keying it and mixes, hold at full
                // value and fade with that entry's mix.
                let mut next = self.entry(to_id).and_then(|to| to.mixing_to);
                while let Some(next_id) = next {
                    let Some(next_entry) = self.entry(next_id) else {
                        break;
                    };
                    if next_entry.animation.has_timeline(&ids) {
                        next = next_entry.mixing_to;
                        continue;
                    }
                    if next_entry.mix_duration > 0.0 {
                        timeline_mode[i] = TimelineMode::HoldMix;
                        timeline_hold_mix[i] = Some(next_id);
                        continue 'timelines;
                    }
                    break;
                }
                timeline_mode[i] = TimelineMode::HoldFirst;
            }
        }

        if let Some(entry) = self.entry_mut(entry_id) {
            entry.timeline_mode = timeline_mode;
            entry.timeline_hold_mix = timeline_hold_mix;
        }
    }

    // Event delivery.

    fn snapshot(&self, id: EntryId) -> TrackEntrySnapshot {
        match self.entry(id) {
            Some(entry) => {
                let animation_index = if entry.animation_index == EMPTY_ANIMATION_INDEX {
                    -1
                } else {
                    i32::try_from(entry.animation_index).unwrap_or(i32::MAX)
                };
                TrackEntrySnapshot {
                    track_index: entry.track_index,
                    animation_index,
                    animation_name: entry.animation.name.clone(),
                    track_time: entry.track_time,
                }
            }
            None => TrackEntrySnapshot {
                track_index: 0,
                animation_index: -2,
                animation_name: "<disposed>".to_string(),
                track_time: 0.0,
            },
        }
    }

    fn drain_event_queue(&mut self) {
        if self.draining || self.drain_disabled {
            return;
        }
        self.draining = true;

        while let Some(queued) = self.event_queue.pop_front() {
            let entry_id = queued.entry;
            let event = queued.event;
            let snapshot = self.snapshot(entry_id);

            // Listeners are taken out while they run so they may mutate the
            // state (including this entry) reentrantly.
            let mut entry_listener = self.entry_mut(entry_id).and_then(|e| e.listener.take());
            if let Some(listener) = entry_listener.as_mut() {
                listener.on_event(self, &snapshot, &event);
            }

            let mut state_listener = self.listener.take();
            if let Some(listener) = state_listener.as_mut() {
                listener.on_event(self, &snapshot, &event);
            }
            if self.listener.is_none() {
                self.listener = state_listener;
            }

            if matches!(event, AnimationStateEvent::Dispose) {
                self.free_entry(entry_id);
            } else if let Some(listener) = entry_listener {
                if let Some(entry) = self.entry_mut(entry_id) {
                    if entry.listener.is_none() {
                        entry.listener = Some(listener);
                    }
                }
            }
        }

        self.draining = false;
    }
}

fn push_event(out: &mut VecDeque<QueuedEvent>, entry: EntryId, event: AnimationStateEvent) {
    out.push_back(QueuedEvent { entry, event });
}

/// Rotate blending that tracks the direction already taken, so a mix keeps
/// turning the same way across frames instead of flipping to the shortest
/// arc every apply.
#[allow(clippy::too_many_arguments)]
fn apply_rotate_mixed(
    timeline: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    rotation: &mut [f32],
    i: usize,
    first_frame: bool,
) {
    if first_frame {
        if let Some(slot) = rotation.get_mut(i) {
            *slot = 0.0;
        }
    }

    if alpha == 1.0 {
        apply_rotate(timeline, skeleton, time, alpha, blend);
        return;
    }

    let frames = &timeline.frames;
    if frames.is_empty() {
        return;
    }
    let Some(setup) = skeleton
        .data
        .bones
        .get(timeline.bone_index)
        .map(|b| b.rotation)
    else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }

    let (r1, r2);
    if time < frames[0].time {
        match blend {
            MixBlend::Setup => {
                bone.rotation = setup;
                return;
            }
            MixBlend::First => {
                r1 = bone.rotation;
                r2 = setup;
            }
            _ => return,
        }
    } else {
        r1 = if blend == MixBlend::Setup {
            setup
        } else {
            bone.rotation
        };
        r2 = setup + sample_rotate(frames, time);
    }

    let mut diff = r2 - r1;
    diff -= normalize_turns(diff) * 360.0;
    let total;
    if diff == 0.0 {
        total = rotation.get(i).copied().unwrap_or(0.0);
    } else {
        let (mut last_total, last_diff) = if first_frame {
            (0.0, diff)
        } else {
            (
                rotation.get(i).copied().unwrap_or(0.0),
                rotation.get(i + 1).copied().unwrap_or(diff),
            )
        };
        let current = diff > 0.0;
        let mut dir = last_total >= 0.0;
        // A sign flip near zero means the rotation crossed 0 rather than
        // 180, so the accumulated direction resets.
        if sign(last_diff) != sign(diff) && last_diff.abs() <= 90.0 {
            if last_total.abs() > 180.0 {
                last_total += 360.0 * sign(last_total);
            }
            dir = current;
        }
        let mut t = diff + last_total - last_total % 360.0;
        if dir != current {
            t += 360.0 * sign(last_total);
        }
        total = t;
    }
    if let Some(slot) = rotation.get_mut(i) {
        *slot = total;
    }
    if let Some(slot) = rotation.get_mut(i + 1) {
        *slot = diff;
    }
    bone.rotation = r1 + total * alpha;
}

/// Sign with a zero case, unlike `f32::signum`.
fn sign(value: f32) -> f32 {
    if value < 0.0 {
        -1.0
    } else if value > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Number of whole turns to subtract so a rotation difference lands in
/// (-180, 180].
fn normalize_turns(diff: f32) -> f32 {
    (16384.0 - (16384.499_999_999_996_f64 - f64::from(diff) / 360.0) as i64 as f64) as f32
}
