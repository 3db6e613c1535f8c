pub use crate::profile::ProfileTrait;
