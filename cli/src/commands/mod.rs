mod helpers;
mod init;
mod inspect;
mod sync;

pub(crate) use init::cmd_init_local;
pub(crate) use inspect::cmd_inspect;
pub(crate) use sync::cmd_sync;
