//! Animation and skeleton data: immutable once built, shared between every
//! `AnimationState`/`Skeleton` instance created from the same data.

use std::collections::HashMap;
use std::sync::Arc;

/// Controls how a timeline value is combined with the pose already on the
/// skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixBlend {
    /// Transitions from the setup pose to the timeline value.
    Setup,
    /// Like `Setup`, but from the current pose when the time is before the
    /// first frame. Used for the lowest track so earlier pose writes fade
    /// out instead of snapping.
    First,
    /// Transitions from the current pose to the timeline value.
    Replace,
    /// Adds the timeline value on top of the current pose.
    Add,
}

/// Whether a timeline is being mixed in (gaining influence) or out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixDirection {
    In,
    Out,
}

/// Interpolation between a frame and the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    Linear,
    Stepped,
    /// Cubic Bezier in absolute (time, value) space; control points lie
    /// between the two frames.
    Bezier { cx1: f32, cy1: f32, cx2: f32, cy2: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RotateFrame {
    pub time: f32,
    /// Degrees, relative to the bone's setup rotation.
    pub rotation: f32,
    pub curve: Curve,
}

/// Two-component frame shared by translate, scale, and shear timelines.
/// Translate/shear values are offsets from setup; scale values are
/// multipliers of the setup scale.
#[derive(Debug, Clone, PartialEq)]
pub struct XyFrame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    pub curve: [Curve; 2],
}

/// Single-component frame (translate/scale/shear X or Y, slot alpha, path
/// constraint position and spacing).
#[derive(Debug, Clone, PartialEq)]
pub struct ValueFrame {
    pub time: f32,
    pub value: f32,
    pub curve: Curve,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorFrame {
    pub time: f32,
    pub color: [f32; 4],
    pub curve: [Curve; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct RgbFrame {
    pub time: f32,
    pub rgb: [f32; 3],
    pub curve: [Curve; 3],
}

/// Two-color tint frame: light RGBA plus dark RGB.
#[derive(Debug, Clone, PartialEq)]
pub struct Rgba2Frame {
    pub time: f32,
    pub light: [f32; 4],
    pub dark: [f32; 3],
    pub curve: [Curve; 7],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rgb2Frame {
    pub time: f32,
    pub light: [f32; 3],
    pub dark: [f32; 3],
    pub curve: [Curve; 6],
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentFrame {
    pub time: f32,
    /// `None` clears the slot's attachment.
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeformFrame {
    pub time: f32,
    /// One value per deformed vertex component. For unweighted attachments
    /// these are vertex positions; for weighted attachments they are
    /// offsets from the bind pose.
    pub vertices: Vec<f32>,
    pub curve: Curve,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub time: f32,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawOrderFrame {
    pub time: f32,
    /// `draw_order[i]` is the slot index drawn at position `i`. `None`
    /// restores the setup draw order.
    pub draw_order: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkFrame {
    pub time: f32,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub curve: [Curve; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformConstraintFrame {
    pub time: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
    pub curve: [Curve; 6],
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathMixFrame {
    pub time: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub curve: [Curve; 3],
}

/// A fired (or keyed) user event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub time: f32,
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: Option<String>,
    pub volume: f32,
    pub balance: f32,
}

impl Event {
    pub fn new(time: f32, name: impl Into<String>) -> Self {
        Event {
            time,
            name: name.into(),
            int_value: 0,
            float_value: 0.0,
            string_value: None,
            volume: 1.0,
            balance: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RotateTimeline {
    pub bone_index: usize,
    pub frames: Vec<RotateFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoneXyTimeline {
    pub bone_index: usize,
    pub frames: Vec<XyFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoneValueTimeline {
    pub bone_index: usize,
    pub frames: Vec<ValueFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RgbaTimeline {
    pub slot_index: usize,
    pub frames: Vec<ColorFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RgbTimeline {
    pub slot_index: usize,
    pub frames: Vec<RgbFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlphaTimeline {
    pub slot_index: usize,
    pub frames: Vec<ValueFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rgba2Timeline {
    pub slot_index: usize,
    pub frames: Vec<Rgba2Frame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rgb2Timeline {
    pub slot_index: usize,
    pub frames: Vec<Rgb2Frame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentTimeline {
    pub slot_index: usize,
    pub frames: Vec<AttachmentFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeformTimeline {
    pub slot_index: usize,
    /// The attachment whose vertices are deformed. The timeline only
    /// applies while the slot displays this attachment.
    pub attachment: String,
    pub frames: Vec<DeformFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventTimeline {
    pub frames: Vec<EventFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkConstraintTimeline {
    pub constraint_index: usize,
    pub frames: Vec<IkFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformConstraintTimeline {
    pub constraint_index: usize,
    pub frames: Vec<TransformConstraintFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathValueTimeline {
    pub constraint_index: usize,
    pub frames: Vec<ValueFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathMixTimeline {
    pub constraint_index: usize,
    pub frames: Vec<PathMixFrame>,
}

/// One keyed property track. The variant set is closed: every property the
/// runtime can animate is known at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum Timeline {
    Rotate(RotateTimeline),
    Translate(BoneXyTimeline),
    TranslateX(BoneValueTimeline),
    TranslateY(BoneValueTimeline),
    Scale(BoneXyTimeline),
    ScaleX(BoneValueTimeline),
    ScaleY(BoneValueTimeline),
    Shear(BoneXyTimeline),
    ShearX(BoneValueTimeline),
    ShearY(BoneValueTimeline),
    Rgba(RgbaTimeline),
    Rgb(RgbTimeline),
    Alpha(AlphaTimeline),
    Rgba2(Rgba2Timeline),
    Rgb2(Rgb2Timeline),
    Attachment(AttachmentTimeline),
    Deform(DeformTimeline),
    Event(EventTimeline),
    DrawOrder(DrawOrderTimeline),
    IkConstraint(IkConstraintTimeline),
    TransformConstraint(TransformConstraintTimeline),
    PathConstraintPosition(PathValueTimeline),
    PathConstraintSpacing(PathValueTimeline),
    PathConstraintMix(PathMixTimeline),
}

// Property kinds for conflict detection between timelines on different
// tracks. An id is (kind << 32) | target, so two timelines share an id only
// when they write the same property of the same bone/slot/constraint.
pub(crate) const PROPERTY_ROTATE: u64 = 0;
pub(crate) const PROPERTY_X: u64 = 1;
pub(crate) const PROPERTY_Y: u64 = 2;
pub(crate) const PROPERTY_SCALE_X: u64 = 3;
pub(crate) const PROPERTY_SCALE_Y: u64 = 4;
pub(crate) const PROPERTY_SHEAR_X: u64 = 5;
pub(crate) const PROPERTY_SHEAR_Y: u64 = 6;
pub(crate) const PROPERTY_RGB: u64 = 7;
pub(crate) const PROPERTY_ALPHA: u64 = 8;
pub(crate) const PROPERTY_RGB2: u64 = 9;
pub(crate) const PROPERTY_ATTACHMENT: u64 = 10;
pub(crate) const PROPERTY_DEFORM: u64 = 11;
pub(crate) const PROPERTY_EVENT: u64 = 12;
pub(crate) const PROPERTY_DRAW_ORDER: u64 = 13;
pub(crate) const PROPERTY_IK_CONSTRAINT: u64 = 14;
pub(crate) const PROPERTY_TRANSFORM_CONSTRAINT: u64 = 15;
pub(crate) const PROPERTY_PATH_POSITION: u64 = 16;
pub(crate) const PROPERTY_PATH_SPACING: u64 = 17;
pub(crate) const PROPERTY_PATH_MIX: u64 = 18;

pub(crate) fn property_id(kind: u64, target: u64) -> u64 {
    (kind << 32) | (target & 0xffff_ffff)
}

/// Folds an attachment name into 16 bits so a deform property id can carry
/// both the slot and the attachment it targets.
fn attachment_key(name: &str) -> u64 {
    let mut h: u32 = 0x811c_9dc5;
    for b in name.bytes() {
        h ^= b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    ((h ^ (h >> 16)) & 0xffff) as u64
}

impl Timeline {
    /// Appends the property ids this timeline writes.
    pub fn property_ids(&self, out: &mut Vec<u64>) {
        match self {
            Timeline::Rotate(t) => out.push(property_id(PROPERTY_ROTATE, t.bone_index as u64)),
            Timeline::Translate(t) => {
                out.push(property_id(PROPERTY_X, t.bone_index as u64));
                out.push(property_id(PROPERTY_Y, t.bone_index as u64));
            }
            Timeline::TranslateX(t) => out.push(property_id(PROPERTY_X, t.bone_index as u64)),
            Timeline::TranslateY(t) => out.push(property_id(PROPERTY_Y, t.bone_index as u64)),
            Timeline::Scale(t) => {
                out.push(property_id(PROPERTY_SCALE_X, t.bone_index as u64));
                out.push(property_id(PROPERTY_SCALE_Y, t.bone_index as u64));
            }
            Timeline::ScaleX(t) => out.push(property_id(PROPERTY_SCALE_X, t.bone_index as u64)),
            Timeline::ScaleY(t) => out.push(property_id(PROPERTY_SCALE_Y, t.bone_index as u64)),
            Timeline::Shear(t) => {
                out.push(property_id(PROPERTY_SHEAR_X, t.bone_index as u64));
                out.push(property_id(PROPERTY_SHEAR_Y, t.bone_index as u64));
            }
            Timeline::ShearX(t) => out.push(property_id(PROPERTY_SHEAR_X, t.bone_index as u64)),
            Timeline::ShearY(t) => out.push(property_id(PROPERTY_SHEAR_Y, t.bone_index as u64)),
            Timeline::Rgba(t) => {
                out.push(property_id(PROPERTY_RGB, t.slot_index as u64));
                out.push(property_id(PROPERTY_ALPHA, t.slot_index as u64));
            }
            Timeline::Rgb(t) => out.push(property_id(PROPERTY_RGB, t.slot_index as u64)),
            Timeline::Alpha(t) => out.push(property_id(PROPERTY_ALPHA, t.slot_index as u64)),
            Timeline::Rgba2(t) => {
                out.push(property_id(PROPERTY_RGB, t.slot_index as u64));
                out.push(property_id(PROPERTY_ALPHA, t.slot_index as u64));
                out.push(property_id(PROPERTY_RGB2, t.slot_index as u64));
            }
            Timeline::Rgb2(t) => {
                out.push(property_id(PROPERTY_RGB, t.slot_index as u64));
                out.push(property_id(PROPERTY_RGB2, t.slot_index as u64));
            }
            Timeline::Attachment(t) => {
                out.push(property_id(PROPERTY_ATTACHMENT, t.slot_index as u64));
            }
            Timeline::Deform(t) => {
                let target = ((t.slot_index as u64) << 16) | attachment_key(&t.attachment);
                out.push(property_id(PROPERTY_DEFORM, target));
            }
            Timeline::Event(_) => out.push(property_id(PROPERTY_EVENT, 0)),
            Timeline::DrawOrder(_) => out.push(property_id(PROPERTY_DRAW_ORDER, 0)),
            Timeline::IkConstraint(t) => {
                out.push(property_id(PROPERTY_IK_CONSTRAINT, t.constraint_index as u64));
            }
            Timeline::TransformConstraint(t) => {
                out.push(property_id(PROPERTY_TRANSFORM_CONSTRAINT, t.constraint_index as u64));
            }
            Timeline::PathConstraintPosition(t) => {
                out.push(property_id(PROPERTY_PATH_POSITION, t.constraint_index as u64));
            }
            Timeline::PathConstraintSpacing(t) => {
                out.push(property_id(PROPERTY_PATH_SPACING, t.constraint_index as u64));
            }
            Timeline::PathConstraintMix(t) => {
                out.push(property_id(PROPERTY_PATH_MIX, t.constraint_index as u64));
            }
        }
    }

    /// Time of the last frame.
    pub fn duration(&self) -> f32 {
        fn last<T>(frames: &[T], time: impl Fn(&T) -> f32) -> f32 {
            frames.last().map(&time).unwrap_or(0.0)
        }
        match self {
            Timeline::Rotate(t) => last(&t.frames, |f| f.time),
            Timeline::Translate(t) | Timeline::Scale(t) | Timeline::Shear(t) => {
                last(&t.frames, |f| f.time)
            }
            Timeline::TranslateX(t)
            | Timeline::TranslateY(t)
            | Timeline::ScaleX(t)
            | Timeline::ScaleY(t)
            | Timeline::ShearX(t)
            | Timeline::ShearY(t) => last(&t.frames, |f| f.time),
            Timeline::Rgba(t) => last(&t.frames, |f| f.time),
            Timeline::Rgb(t) => last(&t.frames, |f| f.time),
            Timeline::Alpha(t) => last(&t.frames, |f| f.time),
            Timeline::Rgba2(t) => last(&t.frames, |f| f.time),
            Timeline::Rgb2(t) => last(&t.frames, |f| f.time),
            Timeline::Attachment(t) => last(&t.frames, |f| f.time),
            Timeline::Deform(t) => last(&t.frames, |f| f.time),
            Timeline::Event(t) => last(&t.frames, |f| f.time),
            Timeline::DrawOrder(t) => last(&t.frames, |f| f.time),
            Timeline::IkConstraint(t) => last(&t.frames, |f| f.time),
            Timeline::TransformConstraint(t) => last(&t.frames, |f| f.time),
            Timeline::PathConstraintPosition(t) | Timeline::PathConstraintSpacing(t) => {
                last(&t.frames, |f| f.time)
            }
            Timeline::PathConstraintMix(t) => last(&t.frames, |f| f.time),
        }
    }
}

/// A named, immutable set of timelines sharing one clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub name: String,
    pub timelines: Vec<Timeline>,
    pub duration: f32,
    timeline_ids: Vec<u64>,
}

impl Animation {
    pub fn new(name: impl Into<String>, timelines: Vec<Timeline>, duration: f32) -> Self {
        let mut timeline_ids = Vec::with_capacity(timelines.len());
        for timeline in &timelines {
            timeline.property_ids(&mut timeline_ids);
        }
        timeline_ids.sort_unstable();
        timeline_ids.dedup();
        Animation {
            name: name.into(),
            timelines,
            duration,
            timeline_ids,
        }
    }

    /// Whether any timeline writes any of the given property ids.
    pub fn has_timeline(&self, ids: &[u64]) -> bool {
        ids.iter()
            .any(|id| self.timeline_ids.binary_search(id).is_ok())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
}

impl BoneData {
    pub fn new(name: impl Into<String>) -> Self {
        BoneData {
            name: name.into(),
            parent: None,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotData {
    pub name: String,
    pub bone: usize,
    /// Setup-pose attachment name, if any.
    pub attachment: Option<String>,
    pub color: [f32; 4],
    pub has_dark: bool,
    pub dark_color: [f32; 3],
}

impl SlotData {
    pub fn new(name: impl Into<String>, bone: usize) -> Self {
        SlotData {
            name: name.into(),
            bone,
            attachment: None,
            color: [1.0, 1.0, 1.0, 1.0],
            has_dark: false,
            dark_color: [0.0, 0.0, 0.0],
        }
    }
}

/// Vertex data for attachments that deform timelines can target. Renderable
/// detail (texture regions, triangles, weights) lives outside this crate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttachmentData {
    pub vertices: Vec<f32>,
    /// Weighted attachments store deform values as offsets from the bind
    /// pose rather than absolute vertex positions.
    pub weighted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkConstraintData {
    pub name: String,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
}

impl IkConstraintData {
    pub fn new(name: impl Into<String>) -> Self {
        IkConstraintData {
            name: name.into(),
            mix: 1.0,
            softness: 0.0,
            bend_direction: 1,
            compress: false,
            stretch: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformConstraintData {
    pub name: String,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
}

impl TransformConstraintData {
    pub fn new(name: impl Into<String>) -> Self {
        TransformConstraintData {
            name: name.into(),
            mix_rotate: 1.0,
            mix_x: 1.0,
            mix_y: 1.0,
            mix_scale_x: 1.0,
            mix_scale_y: 1.0,
            mix_shear_y: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathConstraintData {
    pub name: String,
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
}

impl PathConstraintData {
    pub fn new(name: impl Into<String>) -> Self {
        PathConstraintData {
            name: name.into(),
            position: 0.0,
            spacing: 0.0,
            mix_rotate: 1.0,
            mix_x: 1.0,
            mix_y: 1.0,
        }
    }
}

/// Setup-pose description shared by all skeleton instances built from it.
#[derive(Debug, Clone, Default)]
pub struct SkeletonData {
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    /// Per-slot attachment dictionaries (one entry per slot).
    pub attachments: Vec<HashMap<String, AttachmentData>>,
    pub ik_constraints: Vec<IkConstraintData>,
    pub transform_constraints: Vec<TransformConstraintData>,
    pub path_constraints: Vec<PathConstraintData>,
    pub animations: Vec<Arc<Animation>>,
    pub animation_index: HashMap<String, usize>,
}

impl SkeletonData {
    /// Registers an animation under its name.
    pub fn add_animation(&mut self, animation: Animation) {
        self.animation_index
            .insert(animation.name.clone(), self.animations.len());
        self.animations.push(Arc::new(animation));
    }

    pub fn animation(&self, name: &str) -> Option<(usize, &Arc<Animation>)> {
        let index = *self.animation_index.get(name)?;
        self.animations.get(index).map(|a| (index, a))
    }

    pub fn attachment(&self, slot_index: usize, name: &str) -> Option<&AttachmentData> {
        self.attachments.get(slot_index)?.get(name)
    }
}
