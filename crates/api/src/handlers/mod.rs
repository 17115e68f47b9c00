pub mod export;
pub mod images;
pub mod session;
pub mod video;
