pub mod discriminator;
pub mod generator;
pub mod init;
pub mod module;
pub mod state;

pub use discriminator::{DisOutput, Discriminator, PatchDiscriminator};
pub use generator::{Generator, ResAdaInGenerator};
pub use init::InitPolicy;
pub use module::Module;
pub use state::NetworkState;
