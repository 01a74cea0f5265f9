pub mod ctx;
pub mod dispatch;
pub mod handlers;
pub mod navigator;
pub mod storage;
