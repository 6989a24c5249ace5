mod animation;
mod animation_state;
mod skeleton;

pub use animation::*;
pub use animation_state::*;
pub use skeleton::*;

#[cfg(test)]
mod animation_tests;

#[cfg(test)]
mod animation_state_tests;
