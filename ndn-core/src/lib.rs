//! Named Data Networking endpoint core: the TLV wire format, names and
//! prefix tables, Interest/Data packets with their signatures, and signed
//! forwarder management commands.

use log::info;

pub mod certificate;
pub mod command;
pub mod config;
pub mod content_store;
pub mod exclude;
pub mod grammar;
pub mod lpm;
pub mod name;
pub mod packets;
pub mod pem;
pub mod pit;
pub mod selectors;
pub mod signature;
pub mod tlv;
pub mod varnum;

pub use certificate::Certificate;
pub use command::{Command, ControlParameters, ControlResponse};
pub use config::{Config, ConfigError};
pub use content_store::ContentStore;
pub use exclude::{Exclude, ExcludeEntry};
pub use name::{Component, Name, NameParseError};
pub use packets::{ContentType, Data, Interest, KeyLocator, MetaInfo, Packet, SignatureInfo};
pub use pit::{Pit, PitRecord};
pub use selectors::{ChildSelector, Selectors};
pub use signature::{Key, PublicKey, Signable, SignatureError, SignatureType};
pub use tlv::{tlv_types, TlvElement, TlvError};

/// Load `config` and install its signing key, if one is configured
pub fn init(config: &Config) -> Result<(), ConfigError> {
    if config.install_signing_key()? {
        info!("NDN core initialized with command signing key");
    } else {
        info!("NDN core initialized without a command signing key");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
