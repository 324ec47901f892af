pub mod check;
pub mod delete;
pub mod get;
pub mod init;
pub mod inspect;
pub mod set;
pub mod version;

pub use check::Check;
pub use delete::Delete;
pub use get::Get;
pub use init::Init;
pub use inspect::Inspect;
pub use set::Set;
pub use version::Version;
