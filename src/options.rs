//! Named option values and replayable option snapshots.
//!
//! Every configurable component (transports, the client, the WebSocket
//! transport adapter) implements [`OptionTarget`]. A component's current
//! settings can be captured into an [`OptionHandler`] and later fed back
//! into a fresh instance with [`OptionHandler::feed_options`].

use log::trace;

use crate::error::{Error, Result};

/// A single option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    /// A nested snapshot, used for aggregated options such as all
    /// transport settings under one name.
    Options(OptionHandler),
}

impl OptionValue {
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_options(&self) -> Option<&OptionHandler> {
        match self {
            OptionValue::Options(handler) => Some(handler),
            _ => None,
        }
    }
}

/// Something that accepts named options.
pub trait OptionTarget {
    /// Apply one option.
    ///
    /// # Errors
    ///
    /// Implementations return `Error::UnknownOption` for names they do not
    /// recognise and `Error::InvalidOptionValue` for values of the wrong kind.
    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()>;
}

/// An ordered snapshot of options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionHandler {
    options: Vec<(String, OptionValue)>,
}

impl OptionHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an option. A later value for the same name replaces the
    /// earlier one in place.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty name.
    pub fn add_option(&mut self, name: impl Into<String>, value: OptionValue) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidArgument("option name is empty".into()));
        }
        match self.options.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.options.push((name, value)),
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.options
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.options.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Apply every recorded option to `target`, in the order recorded.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first error `target` reports.
    pub fn feed_options<T: OptionTarget + ?Sized>(&self, target: &mut T) -> Result<()> {
        for (name, value) in &self.options {
            trace!("Feeding option {name}");
            target.set_option(name, value)?;
        }
        Ok(())
    }
}
