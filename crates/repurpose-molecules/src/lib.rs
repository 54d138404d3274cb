//! repurpose-molecules: structures, compounds and docking.
//!
//! 1. Protein structures from RCSB PDB (search, metadata, download)
//! 2. Small-molecule lookup and 3-D similarity search from PubChem
//! 3. GPU docking jobs on a RunPod serverless endpoint
//! 4. The structure acquisition and docking stages built on top of them

pub mod pdb;
pub mod pubchem;
pub mod docking;
pub mod structures;
pub mod pipeline;

pub use docking::{DockingService, RunPodClient};
pub use pdb::{RcsbClient, StructureSource};
pub use pipeline::{DockingOptions, DockingStage};
pub use pubchem::{Compound, CompoundSource, PubChemClient};
pub use structures::StructureStage;
