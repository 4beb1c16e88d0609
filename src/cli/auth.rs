//! Credential status and logout commands.

use std::path::Path;

use crate::auth::{CredentialStore, FileCredentialStore};
use crate::config::DeviceConfig;

fn open_store(config_path: Option<&Path>) -> Result<FileCredentialStore, Box<dyn std::error::Error>> {
    let config = DeviceConfig::load(config_path)?;
    Ok(FileCredentialStore::new(config.store_dir()))
}

/// Handle `tether status`.
pub fn handle_status(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config_path)?;
    let credentials = store.load()?;

    println!("Credential file: {}", store.path().display());
    if credentials.is_authenticated() {
        println!("Status: logged in");
    } else {
        println!("Status: not logged in (the device will start a login on `tether run`)");
    }
    Ok(())
}

/// Handle `tether logout`.
pub fn handle_logout(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config_path)?;
    store.clear()?;
    println!("Stored credentials removed");
    Ok(())
}
