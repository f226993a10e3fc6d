//! In-memory function platform for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{PlatformError, PlatformErrorKind};
use crate::types::{AliasRecord, FunctionRecord, LATEST_VERSION};

use super::{
    AliasRequest, CreateFunctionRequest, FunctionPlatform, FunctionSettings, UpdateCodeRequest,
    UpdateConfigurationRequest,
};

/// Platform operations, used to inject failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformOperation {
    /// `get_function`
    GetFunction,
    /// `create_function`
    CreateFunction,
    /// `update_function_code`
    UpdateFunctionCode,
    /// `update_function_configuration`
    UpdateFunctionConfiguration,
    /// `get_alias`
    GetAlias,
    /// `create_alias`
    CreateAlias,
    /// `update_alias`
    UpdateAlias,
}

/// A call received by [`MemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCall {
    /// Which operation was called.
    pub operation: PlatformOperation,
    /// Function identifier the call targeted.
    pub function: String,
    /// Alias name, for alias operations.
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredFunction {
    latest: FunctionRecord,
    published: u32,
}

#[derive(Debug, Default)]
struct State {
    functions: HashMap<String, StoredFunction>,
    aliases: HashMap<(String, String), AliasRecord>,
    calls: Vec<PlatformCall>,
    failures: HashMap<PlatformOperation, VecDeque<PlatformError>>,
}

impl State {
    fn record(&mut self, operation: PlatformOperation, function: &str, alias: Option<&str>) {
        self.calls.push(PlatformCall {
            operation,
            function: function.to_owned(),
            alias: alias.map(ToOwned::to_owned),
        });
    }

    fn injected(&mut self, operation: PlatformOperation) -> Result<(), PlatformError> {
        match self
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory function platform.
///
/// Records every call it receives and lets tests queue failures per
/// operation. Version numbers are assigned per function starting at 1,
/// mirroring the platform's monotonic versioning.
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    /// Create an empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an existing function with `published` versions already cut.
    pub fn seed_function(&self, name: &str, published: u32) {
        let latest = FunctionRecord {
            name: name.to_owned(),
            arn: Some(format!("arn:memory:function:{name}")),
            version: LATEST_VERSION.to_owned(),
            ..FunctionRecord::default()
        };
        self.state()
            .functions
            .insert(name.to_owned(), StoredFunction { latest, published });
    }

    /// Register an existing alias.
    pub fn seed_alias(&self, function_name: &str, name: &str, version: &str) {
        self.state().aliases.insert(
            (function_name.to_owned(), name.to_owned()),
            AliasRecord {
                name: name.to_owned(),
                function_name: function_name.to_owned(),
                function_version: version.to_owned(),
            },
        );
    }

    /// Make the next call of `operation` fail with `error`.
    ///
    /// Failures queue up: calling this twice fails the next two calls.
    pub fn fail_next(&self, operation: PlatformOperation, error: PlatformError) {
        self.state()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// All calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state().calls.clone()
    }

    /// Number of calls of `operation` received so far.
    #[must_use]
    pub fn count(&self, operation: PlatformOperation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Current `$LATEST` record of a function.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<FunctionRecord> {
        self.state()
            .functions
            .get(name)
            .map(|stored| stored.latest.clone())
    }

    /// Current state of an alias.
    #[must_use]
    pub fn alias(&self, function_name: &str, name: &str) -> Option<AliasRecord> {
        self.state()
            .aliases
            .get(&(function_name.to_owned(), name.to_owned()))
            .cloned()
    }
}

/// Strip a fully qualified function ARN down to the function name.
fn function_name(function_id: &str) -> &str {
    function_id
        .rsplit_once(":function:")
        .map_or(function_id, |(_, name)| name)
}

fn apply_settings(record: &mut FunctionRecord, settings: &FunctionSettings) {
    record.handler = Some(settings.handler.clone());
    record.runtime = Some(settings.runtime.clone());
    record.memory_size = Some(settings.memory_size);
    record.timeout = Some(settings.timeout);
    record.role = Some(settings.role.clone());
    record.description = Some(settings.description.clone());
}

fn missing_function(name: &str) -> PlatformError {
    PlatformError::not_found(format!("function not found: {name}"))
}

fn publish(stored: &mut StoredFunction) -> FunctionRecord {
    stored.published += 1;
    FunctionRecord {
        version: stored.published.to_string(),
        ..stored.latest.clone()
    }
}

#[async_trait]
impl FunctionPlatform for MemoryPlatform {
    async fn get_function(&self, function_id: &str) -> Result<FunctionRecord, PlatformError> {
        let mut state = self.state();
        state.record(PlatformOperation::GetFunction, function_id, None);
        state.injected(PlatformOperation::GetFunction)?;

        let name = function_name(function_id);
        state
            .functions
            .get(name)
            .map(|stored| stored.latest.clone())
            .ok_or_else(|| missing_function(name))
    }

    async fn create_function(
        &self,
        request: &CreateFunctionRequest,
    ) -> Result<FunctionRecord, PlatformError> {
        let mut state = self.state();
        state.record(PlatformOperation::CreateFunction, &request.function_name, None);
        state.injected(PlatformOperation::CreateFunction)?;

        if state.functions.contains_key(&request.function_name) {
            return Err(PlatformError::new(
                PlatformErrorKind::Conflict,
                format!("function already exists: {}", request.function_name),
            ));
        }

        let mut latest = FunctionRecord {
            name: request.function_name.clone(),
            arn: Some(format!("arn:memory:function:{}", request.function_name)),
            version: LATEST_VERSION.to_owned(),
            ..FunctionRecord::default()
        };
        apply_settings(&mut latest, &request.settings);

        let mut stored = StoredFunction {
            latest,
            published: 0,
        };
        let record = if request.publish {
            publish(&mut stored)
        } else {
            stored.latest.clone()
        };

        state
            .functions
            .insert(request.function_name.clone(), stored);
        Ok(record)
    }

    async fn update_function_code(
        &self,
        request: &UpdateCodeRequest,
    ) -> Result<FunctionRecord, PlatformError> {
        let mut state = self.state();
        state.record(PlatformOperation::UpdateFunctionCode, &request.function_name, None);
        state.injected(PlatformOperation::UpdateFunctionCode)?;

        let stored = state
            .functions
            .get_mut(&request.function_name)
            .ok_or_else(|| missing_function(&request.function_name))?;

        if request.publish {
            Ok(publish(stored))
        } else {
            Ok(stored.latest.clone())
        }
    }

    async fn update_function_configuration(
        &self,
        request: &UpdateConfigurationRequest,
    ) -> Result<FunctionRecord, PlatformError> {
        let mut state = self.state();
        state.record(
            PlatformOperation::UpdateFunctionConfiguration,
            &request.function_name,
            None,
        );
        state.injected(PlatformOperation::UpdateFunctionConfiguration)?;

        let stored = state
            .functions
            .get_mut(&request.function_name)
            .ok_or_else(|| missing_function(&request.function_name))?;

        apply_settings(&mut stored.latest, &request.settings);
        Ok(stored.latest.clone())
    }

    async fn get_alias(
        &self,
        function_name: &str,
        name: &str,
    ) -> Result<AliasRecord, PlatformError> {
        let mut state = self.state();
        state.record(PlatformOperation::GetAlias, function_name, Some(name));
        state.injected(PlatformOperation::GetAlias)?;

        state
            .aliases
            .get(&(function_name.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| PlatformError::not_found(format!("alias not found: {name}")))
    }

    async fn create_alias(&self, request: &AliasRequest) -> Result<AliasRecord, PlatformError> {
        let mut state = self.state();
        state.record(
            PlatformOperation::CreateAlias,
            &request.function_name,
            Some(&request.name),
        );
        state.injected(PlatformOperation::CreateAlias)?;

        let key = (request.function_name.clone(), request.name.clone());
        if state.aliases.contains_key(&key) {
            return Err(PlatformError::new(
                PlatformErrorKind::Conflict,
                format!("alias already exists: {}", request.name),
            ));
        }

        let alias = AliasRecord {
            name: request.name.clone(),
            function_name: request.function_name.clone(),
            function_version: request.function_version.clone(),
        };
        state.aliases.insert(key, alias.clone());
        Ok(alias)
    }

    async fn update_alias(&self, request: &AliasRequest) -> Result<AliasRecord, PlatformError> {
        let mut state = self.state();
        state.record(
            PlatformOperation::UpdateAlias,
            &request.function_name,
            Some(&request.name),
        );
        state.injected(PlatformOperation::UpdateAlias)?;

        let alias = state
            .aliases
            .get_mut(&(request.function_name.clone(), request.name.clone()))
            .ok_or_else(|| PlatformError::not_found(format!("alias not found: {}", request.name)))?;

        alias.function_version = request.function_version.clone();
        Ok(alias.clone())
    }
}
