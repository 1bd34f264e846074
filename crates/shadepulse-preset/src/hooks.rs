//! Optional lifecycle callbacks a preset can attach in code.
//!
//! Hooks are user content running inside the frame loop, so every invocation goes through
//! [`guarded`]: an `Err` or a panic becomes a [`HookError`] for the caller to log.

use std::panic::{catch_unwind, AssertUnwindSafe};

use shadepulse_audio::{AudioFrame, BeatState};

use crate::uniform::PresetUniforms;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),
    #[error("hook panicked: {0}")]
    Panicked(String),
}

impl HookError {
    pub fn msg<T: Into<String>>(s: T) -> Self {
        HookError::Failed(s.into())
    }
}

/// Inputs handed to an `update` hook before uniforms are sampled.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    pub audio: &'a AudioFrame<'a>,
    pub beat: BeatState,
    /// Seconds since the preset was loaded.
    pub elapsed: f32,
    pub frame: u64,
}

pub type InitHook = Box<dyn FnMut(&mut PresetUniforms) -> Result<(), HookError>>;
pub type UpdateHook =
    Box<dyn FnMut(&UpdateContext<'_>, &mut PresetUniforms) -> Result<(), HookError>>;
pub type DestroyHook = Box<dyn FnOnce() -> Result<(), HookError>>;

#[derive(Default)]
pub struct PresetHooks {
    pub init: Option<InitHook>,
    pub update: Option<UpdateHook>,
    pub destroy: Option<DestroyHook>,
}

impl std::fmt::Debug for PresetHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresetHooks")
            .field("init", &self.init.is_some())
            .field("update", &self.update.is_some())
            .field("destroy", &self.destroy.is_some())
            .finish()
    }
}

impl PresetHooks {
    pub fn is_empty(&self) -> bool {
        self.init.is_none() && self.update.is_none() && self.destroy.is_none()
    }

    pub fn run_init(&mut self, uniforms: &mut PresetUniforms) -> Result<(), HookError> {
        match self.init.as_mut() {
            Some(f) => guarded(|| f(uniforms)),
            None => Ok(()),
        }
    }

    pub fn run_update(
        &mut self,
        ctx: &UpdateContext<'_>,
        uniforms: &mut PresetUniforms,
    ) -> Result<(), HookError> {
        match self.update.as_mut() {
            Some(f) => guarded(|| f(ctx, uniforms)),
            None => Ok(()),
        }
    }

    /// Runs the destroy hook at most once.
    pub fn run_destroy(&mut self) -> Result<(), HookError> {
        match self.destroy.take() {
            Some(f) => guarded(f),
            None => Ok(()),
        }
    }
}

/// Runs `f`, turning a panic into [`HookError::Panicked`].
pub fn guarded<R>(f: impl FnOnce() -> Result<R, HookError>) -> Result<R, HookError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(payload) => Err(HookError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
