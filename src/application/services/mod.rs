pub mod pacer;
pub mod qr_code;
pub mod readiness;
pub mod stop_signal;
pub mod transport;
