mod device_id;
mod entity;
mod repository;
mod status;

pub use device_id::DeviceId;
pub use entity::Device;
pub use repository::{DeviceRepository, DeviceUpdate};
pub use status::DeviceStatus;
