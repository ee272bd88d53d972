//! Built-in mediators and their factories

pub mod filter;
pub mod log;
pub mod loopback;
pub mod makefault;
pub mod property;
pub mod sequence;
pub mod terminal;

pub use filter::{FilterMediator, FilterMediatorFactory};
pub use log::{LogMediator, LogMediatorFactory};
pub use loopback::{LoopbackMediator, LoopbackMediatorFactory};
pub use makefault::{MakeFaultMediator, MakeFaultMediatorFactory};
pub use property::{PropertyMediator, PropertyMediatorFactory};
pub use sequence::{SequenceMediator, SequenceMediatorFactory};
pub use terminal::{DropMediator, DropMediatorFactory, RespondMediator, RespondMediatorFactory};
