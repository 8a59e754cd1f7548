pub mod events;
pub mod messaging;
pub mod monitoring;
pub mod platforms;
pub mod rebooking;
pub mod webhooks;
