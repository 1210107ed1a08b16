pub mod gui;
pub mod input;
pub mod keys;
pub mod midi;
pub mod player;
