//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use arc_swap::ArcSwapOption;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::NoSQLError;

/// A cached value shared by concurrent requests, refreshed by at most one of them at a time.
///
/// Reads are lock-free. A caller that finds the value missing or stale takes
/// the refresh lock, checks again, and only then refreshes; callers queued
/// behind it reuse the new value. If the refreshing caller is cancelled, the
/// lock is released and the next caller refreshes instead.
pub(crate) struct RefreshCell<T> {
    value: ArcSwapOption<T>,
    refresh_lock: tokio::sync::Mutex<()>,
    refreshes: AtomicU64,
}

impl<T> RefreshCell<T> {
    pub(crate) fn new() -> RefreshCell<T> {
        RefreshCell {
            value: ArcSwapOption::empty(),
            refresh_lock: tokio::sync::Mutex::new(()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub(crate) fn peek(&self) -> Option<Arc<T>> {
        self.value.load_full()
    }

    pub(crate) fn invalidate(&self) {
        self.value.store(None);
    }

    /// Number of completed refreshes.
    pub(crate) fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub(crate) async fn get_or_refresh<V, F, Fut>(
        &self,
        is_valid: V,
        refresh: F,
    ) -> Result<Arc<T>, NoSQLError>
    where
        V: Fn(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, NoSQLError>>,
    {
        if let Some(v) = self.current(&is_valid) {
            return Ok(v);
        }
        let _guard = self.refresh_lock.lock().await;
        if let Some(v) = self.current(&is_valid) {
            return Ok(v);
        }
        let v = Arc::new(refresh().await?);
        self.value.store(Some(v.clone()));
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(v)
    }

    fn current<V: Fn(&T) -> bool>(&self, is_valid: &V) -> Option<Arc<T>> {
        match self.value.load_full() {
            Some(v) if is_valid(&v) => Some(v),
            _ => None,
        }
    }
}

impl<T> Default for RefreshCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RefreshCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCell")
            .field("cached", &self.value.load().is_some())
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}
