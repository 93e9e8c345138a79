pub mod executor;
pub mod pgbackrest;
pub mod replication;
pub mod scripted;
pub mod snapshot;
pub mod source;
pub mod systemd;

pub use executor::{shell_quote, CommandOutput, RemoteExecutor, SshExecutor, SshOptions};
pub use scripted::ScriptedExecutor;
pub use snapshot::ResticProbe;
pub use source::ProbeSource;
