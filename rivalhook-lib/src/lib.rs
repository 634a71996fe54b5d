pub mod address_table;
pub mod apply;
pub mod capture;
pub mod channel;
pub mod clock;
pub mod hook;
pub mod lane;
pub mod memory_accessors;
pub mod records;
pub mod settings;
pub mod tick_bridge;

pub use address_table::{AddressTable, StateAddresses};
pub use apply::ActionApply;
pub use capture::StateCapture;
pub use channel::{in_process_pair, ConsumerChannel, HostChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use hook::{HookBinding, HookError, HookSite, JumpStub, PreparedHook};
pub use lane::ChannelError;
pub use records::{ActionCommand, Record, Sequenced, SimulationSnapshot, WireError};
pub use settings::{ChannelSettings, Settings, SettingsError};
pub use tick_bridge::{TickBridge, TickOutcome, TickStats};
