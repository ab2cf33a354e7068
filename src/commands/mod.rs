pub mod play;
pub mod register;
pub mod soundboard;
pub mod voice;
