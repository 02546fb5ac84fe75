pub mod cluster;
pub mod inspect;
