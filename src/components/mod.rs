pub mod channels;
pub mod container;
pub mod format;
pub mod layout;
pub mod resource;
pub mod window;
