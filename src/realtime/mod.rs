pub mod events;
pub mod gateway;
pub mod locations;
pub mod notifier;
