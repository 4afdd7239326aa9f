//! # sf-widgets
//!
//! The interactive pieces of the showcase site, stripped of markup: the
//! identity gate, the live collection mirror, the vote aggregator, the
//! comment threader, the banner rotator, and the session glue that wires
//! them to one studio slug. All derived state is recomputed from the
//! latest snapshot; nothing here accumulates deltas.

pub mod banner;
pub mod comments;
pub mod gate;
pub mod mirror;
pub mod session;
pub mod showcase;
pub mod votes;

pub use banner::*;
pub use comments::*;
pub use gate::*;
pub use mirror::*;
pub use session::*;
pub use showcase::*;
pub use votes::*;
