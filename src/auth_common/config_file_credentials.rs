//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use async_trait::async_trait;
use ini::Ini;

use crate::auth_common::credentials::{CloudCredentials, CredentialSource, Credentials};
use crate::auth_common::file_utils::{expand_user_home, file_to_string};
use crate::error::{ia_err, NoSQLError};

pub(crate) const DEFAULT_CONFIG_FILE_PATH: &str = "~/.oci/config";
const TENANCY: &str = "tenancy";
const USER: &str = "user";
const PASS_PHRASE: &str = "pass_phrase";
const KEY_FILE: &str = "key_file";
const FINGERPRINT: &str = "fingerprint";
const REGION: &str = "region";

/// Cloud credentials read from a profile of an OCI-style config file.
///
/// The file is read each time the source is loaded, which happens once per
/// provider unless the provider is invalidated.
#[derive(Debug, Clone)]
pub struct ConfigFileCredentials {
    path: String,
    profile: String,
}

fn get_section_variable(
    file: &str,
    props: &ini::Properties,
    var: &str,
) -> Result<String, NoSQLError> {
    match props.get(var) {
        Some(v) => Ok(v.to_string()),
        None => ia_err!(
            "error reading OCI config file '{}': missing field '{}'",
            file,
            var
        ),
    }
}

impl ConfigFileCredentials {
    /// Use the given profile of the config file at `config_file_path`.
    pub fn new(config_file_path: &str, profile_name: &str) -> ConfigFileCredentials {
        ConfigFileCredentials {
            path: config_file_path.to_string(),
            profile: profile_name.to_string(),
        }
    }

    /// Use the `DEFAULT` profile of `~/.oci/config`.
    pub fn default_profile() -> ConfigFileCredentials {
        ConfigFileCredentials::new(DEFAULT_CONFIG_FILE_PATH, "DEFAULT")
    }

    /// Read the profile and the private key file it names.
    pub fn read(&self) -> Result<CloudCredentials, NoSQLError> {
        tracing::debug!(
            "reading cloud credentials from file {} and profile {}",
            self.path,
            self.profile
        );
        let file_path = expand_user_home(&self.path)?;
        let config = match Ini::load_from_file(&file_path) {
            Ok(c) => c,
            Err(e) => {
                return ia_err!("error reading OCI config file '{}': {}", file_path, e);
            }
        };
        let profile_data = match config.section(Some(self.profile.as_str())) {
            Some(p) => p,
            None => {
                return ia_err!(
                    "error reading OCI config file '{}': missing profile '{}'",
                    file_path,
                    self.profile
                );
            }
        };

        let tenancy_id = get_section_variable(&file_path, profile_data, TENANCY)?;
        let user_id = get_section_variable(&file_path, profile_data, USER)?;
        let fingerprint = get_section_variable(&file_path, profile_data, FINGERPRINT)?;
        let pem_file_path = get_section_variable(&file_path, profile_data, KEY_FILE)?;

        let region = profile_data.get(REGION).map(|r| r.to_string());
        if region.is_none() {
            tracing::debug!("no '{}' specified in OCI config file", REGION);
        }

        Ok(CloudCredentials {
            tenancy_id,
            user_id,
            fingerprint,
            private_key_pem: file_to_string(&pem_file_path)?,
            passphrase: profile_data.get(PASS_PHRASE).map(|p| p.to_string()),
            region,
        })
    }
}

#[async_trait]
impl CredentialSource for ConfigFileCredentials {
    async fn load(&self) -> Result<Credentials, NoSQLError> {
        Ok(Credentials::Cloud(self.read()?))
    }
}
