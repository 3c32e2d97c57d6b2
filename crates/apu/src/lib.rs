//! Appending unit: segmented virtual-to-absolute address translation with
//! descriptor walks, associative memories and a micro-cache.

pub mod appending;
pub mod fault;
pub mod types;
pub mod ucache;
pub mod walk;
pub mod wam;
pub mod words;

pub use appending::{Apu, ApuState};
pub use fault::{AcvFlags, DirectedKind, Fault, FaultKind};
pub use types::*;
pub use ucache::{Cycle, MicroCache, UcacheStats, UsageClass};
pub use walk::{translate, PhysMem, PhysMemError, Translation};
pub use wam::{PageTag, Wam, Wams};
pub use words::{AccessKind, Dsbr, Ptw, RingBrackets, Sdw, SdwAccess};
