pub mod http_bridge;
pub mod qr_file;
