//! Mutable pose state written by timeline evaluation. This is a pose
//! container only: world transforms and constraint solving happen outside
//! the sequencing core.

use std::sync::Arc;

use crate::SkeletonData;

/// Local bone transform.
#[derive(Debug, Clone)]
pub struct Bone {
    pub data_index: usize,
    pub parent: Option<usize>,
    /// Inactive bones are skipped by every timeline.
    pub active: bool,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub data_index: usize,
    pub bone: usize,
    pub attachment: Option<String>,
    /// Generation marker used by the animation state to detect slots whose
    /// attachment was not keyed during an apply pass.
    pub attachment_state: i32,
    pub deform: Vec<f32>,
    pub color: [f32; 4],
    pub has_dark: bool,
    pub dark_color: [f32; 3],
}

impl Slot {
    /// Sets the attachment, clearing any deform when it actually changes.
    pub fn set_attachment(&mut self, name: Option<&str>) {
        if self.attachment.as_deref() == name {
            return;
        }
        self.attachment = name.map(str::to_string);
        self.deform.clear();
    }
}

#[derive(Debug, Clone)]
pub struct IkConstraint {
    pub data_index: usize,
    pub active: bool,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
}

#[derive(Debug, Clone)]
pub struct TransformConstraint {
    pub data_index: usize,
    pub active: bool,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
}

#[derive(Debug, Clone)]
pub struct PathConstraint {
    pub data_index: usize,
    pub active: bool,
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
}

#[derive(Debug, Clone)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    pub slots: Vec<Slot>,
    /// Slot indices in draw sequence; the setup order is the identity.
    pub draw_order: Vec<usize>,
    pub ik_constraints: Vec<IkConstraint>,
    pub transform_constraints: Vec<TransformConstraint>,
    pub path_constraints: Vec<PathConstraint>,
}

impl Skeleton {
    pub fn new(data: Arc<SkeletonData>) -> Self {
        let bones = data
            .bones
            .iter()
            .enumerate()
            .map(|(data_index, bone)| Bone {
                data_index,
                parent: bone.parent,
                active: true,
                x: bone.x,
                y: bone.y,
                rotation: bone.rotation,
                scale_x: bone.scale_x,
                scale_y: bone.scale_y,
                shear_x: bone.shear_x,
                shear_y: bone.shear_y,
            })
            .collect();

        let slots = data
            .slots
            .iter()
            .enumerate()
            .map(|(data_index, slot)| Slot {
                data_index,
                bone: slot.bone,
                attachment: slot.attachment.clone(),
                attachment_state: 0,
                deform: Vec::new(),
                color: slot.color,
                has_dark: slot.has_dark,
                dark_color: slot.dark_color,
            })
            .collect();

        let draw_order = (0..data.slots.len()).collect();

        let ik_constraints = data
            .ik_constraints
            .iter()
            .enumerate()
            .map(|(data_index, ik)| IkConstraint {
                data_index,
                active: true,
                mix: ik.mix,
                softness: ik.softness,
                bend_direction: ik.bend_direction,
                compress: ik.compress,
                stretch: ik.stretch,
            })
            .collect();

        let transform_constraints = data
            .transform_constraints
            .iter()
            .enumerate()
            .map(|(data_index, tc)| TransformConstraint {
                data_index,
                active: true,
                mix_rotate: tc.mix_rotate,
                mix_x: tc.mix_x,
                mix_y: tc.mix_y,
                mix_scale_x: tc.mix_scale_x,
                mix_scale_y: tc.mix_scale_y,
                mix_shear_y: tc.mix_shear_y,
            })
            .collect();

        let path_constraints = data
            .path_constraints
            .iter()
            .enumerate()
            .map(|(data_index, pc)| PathConstraint {
                data_index,
                active: true,
                position: pc.position,
                spacing: pc.spacing,
                mix_rotate: pc.mix_rotate,
                mix_x: pc.mix_x,
                mix_y: pc.mix_y,
            })
            .collect();

        Skeleton {
            data,
            bones,
            slots,
            draw_order,
            ik_constraints,
            transform_constraints,
            path_constraints,
        }
    }

    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    /// Resets local bone transforms and constraint poses to the setup pose.
    pub fn set_bones_to_setup_pose(&mut self) {
        for bone in &mut self.bones {
            let Some(data) = self.data.bones.get(bone.data_index) else {
                continue;
            };
            bone.x = data.x;
            bone.y = data.y;
            bone.rotation = data.rotation;
            bone.scale_x = data.scale_x;
            bone.scale_y = data.scale_y;
            bone.shear_x = data.shear_x;
            bone.shear_y = data.shear_y;
        }

        for ik in &mut self.ik_constraints {
            let Some(data) = self.data.ik_constraints.get(ik.data_index) else {
                continue;
            };
            ik.mix = data.mix;
            ik.softness = data.softness;
            ik.bend_direction = data.bend_direction;
            ik.compress = data.compress;
            ik.stretch = data.stretch;
        }

        for tc in &mut self.transform_constraints {
            let Some(data) = self.data.transform_constraints.get(tc.data_index) else {
                continue;
            };
            tc.mix_rotate = data.mix_rotate;
            tc.mix_x = data.mix_x;
            tc.mix_y = data.mix_y;
            tc.mix_scale_x = data.mix_scale_x;
            tc.mix_scale_y = data.mix_scale_y;
            tc.mix_shear_y = data.mix_shear_y;
        }

        for pc in &mut self.path_constraints {
            let Some(data) = self.data.path_constraints.get(pc.data_index) else {
                continue;
            };
            pc.position = data.position;
            pc.spacing = data.spacing;
            pc.mix_rotate = data.mix_rotate;
            pc.mix_x = data.mix_x;
            pc.mix_y = data.mix_y;
        }
    }

    /// Resets attachments, colors, deforms, and the draw order.
    pub fn set_slots_to_setup_pose(&mut self) {
        for (i, index) in self.draw_order.iter_mut().enumerate() {
            *index = i;
        }
        for slot in &mut self.slots {
            let Some(data) = self.data.slots.get(slot.data_index) else {
                continue;
            };
            slot.set_attachment(data.attachment.as_deref());
            slot.color = data.color;
            slot.dark_color = data.dark_color;
            slot.deform.clear();
        }
    }
}
