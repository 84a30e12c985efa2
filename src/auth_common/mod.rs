//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
pub mod authorization_provider;
pub(crate) mod clock;
pub mod config_file_credentials;
pub mod credentials;
pub(crate) mod file_utils;
pub(crate) mod private_key;
pub(crate) mod refresh;
pub mod signature_provider;
pub(crate) mod signer;
pub mod store_access_token_provider;
pub mod trust;
