//! Lookup table from script verbs to converter constructors.

use std::collections::BTreeMap;

use crate::converter::{crop, gain, mix, mute, BuildContext, Converter, Crop, Gain, Mix, Mute};
use crate::error::{Result, SoundError};

/// Constructor validating a command and producing a converter.
pub type BuildFn = fn(&BuildContext<'_>) -> Result<Converter>;

/// A registered converter.
#[derive(Clone, Copy)]
pub struct ConverterEntry {
    pub build: BuildFn,
    pub description: &'static str,
    pub usage: &'static str,
}

/// Maps verbs such as `mute` to their constructors.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    entries: BTreeMap<&'static str, ConverterEntry>,
}

impl ConverterRegistry {
    /// A registry with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in converters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            mute::VERB,
            ConverterEntry {
                build: Mute::build,
                description: mute::DESCRIPTION,
                usage: mute::USAGE,
            },
        );
        registry.register(
            gain::VERB,
            ConverterEntry {
                build: Gain::build,
                description: gain::DESCRIPTION,
                usage: gain::USAGE,
            },
        );
        registry.register(
            crop::VERB,
            ConverterEntry {
                build: Crop::build,
                description: crop::DESCRIPTION,
                usage: crop::USAGE,
            },
        );
        registry.register(
            mix::VERB,
            ConverterEntry {
                build: Mix::build,
                description: mix::DESCRIPTION,
                usage: mix::USAGE,
            },
        );
        registry
    }

    /// Register `entry` under `verb`, replacing any previous entry.
    pub fn register(&mut self, verb: &'static str, entry: ConverterEntry) {
        self.entries.insert(verb, entry);
    }

    /// Build and validate the converter for `ctx.command`.
    pub fn create(&self, ctx: &BuildContext<'_>) -> Result<Converter> {
        let entry = self
            .entries
            .get(ctx.command.verb.as_str())
            .ok_or_else(|| SoundError::UnknownCommand {
                line: ctx.command.line,
                verb: ctx.command.verb.clone(),
            })?;
        (entry.build)(ctx)
    }

    pub fn contains(&self, verb: &str) -> bool {
        self.entries.contains_key(verb)
    }

    /// Registered verbs in alphabetical order.
    pub fn verbs(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn usage(&self, verb: &str) -> Option<&'static str> {
        self.entries.get(verb).map(|entry| entry.usage)
    }

    /// Human readable list of every converter and its usage.
    pub fn help(&self) -> String {
        let mut help = String::from("Available converters:\n");
        for (verb, entry) in &self.entries {
            help.push_str(&format!("  {verb}: {}\n      {}\n", entry.description, entry.usage));
        }
        help
    }
}
