pub mod gpu_pool;
pub mod ip_pool;
pub mod port_pool;

pub use gpu_pool::GpuPool;
pub use ip_pool::IpPool;
pub use port_pool::PortPool;
