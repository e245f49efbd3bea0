//! Closed sets of runtime choices.
//!
//! Each mode parses case-insensitively from its lowercase name, which is
//! also how it serialises, so the same spelling works in config files,
//! environment variables and command-line flags.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Failure to recognise a mode name.
pub type ModeParseError = strum::ParseError;

macro_rules! mode {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$variant_meta:meta])* $variant:ident,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            Hash,
            Deserialize,
            Serialize,
            EnumString,
            Display,
            IntoStaticStr,
        )]
        #[serde(rename_all = "lowercase")]
        #[strum(serialize_all = "lowercase", ascii_case_insensitive)]
        pub enum $name {
            $($(#[$variant_meta])* $variant,)+
        }
    };
}

mode! {
    /// Shape of each log record written to stderr.
    LogFormat {
        /// One JSON object per record, fields flattened.
        #[default]
        Json,
        /// One terse human-readable line per record.
        Compact,
    }
}

mode! {
    /// How the line reader hands decoded events to the dispatcher.
    DispatchMode {
        /// Each event is dispatched on its own thread, so a listener may
        /// block (for example on a correlated request) without stalling the
        /// reader.
        #[default]
        Detached,
        /// Events are dispatched on the reader thread in arrival order.
        /// Listeners must not block.
        Inline,
    }
}
