mod recon_world;
mod setups;
mod steps;

pub use recon_world::ReconWorld;
