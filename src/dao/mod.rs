/// Storage abstraction layer errors.
pub mod storage;
/// Drivers for the backing store and their lifecycle notifications.
pub mod store_driver;
