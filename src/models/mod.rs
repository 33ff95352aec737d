pub mod identity;
pub mod offer;
pub mod presence;
pub mod ride;
