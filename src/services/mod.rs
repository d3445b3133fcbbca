pub mod codec;
pub mod receiver;
pub mod registry;
pub mod worker;
