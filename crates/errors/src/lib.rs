//! `ez80_errors` provides basic features to declare human-understandable
//! errors, along with diagnostics.
//!
//! First off, `ez80_errors` provides the [`error!`] macro that helps to
//! declare types that implement [`std::error::Error`], and also derive
//! [`thiserror::Error`] and [`miette::Diagnostic`]. The macro helps to define
//! error code, message, formatted message, and help. It automatically
//! generates documentation, with intra-links to the [`Diagnostics`] type. As
//! an example, see the [`Error`] type that is built with this macro!
//!
//! The second feature provided by `ez80_errors` is [`Diagnostics`]. When an
//! error has a code, e.g. `E030`, it can be used to further explain an error
//! with `ez80asm --explain E030`, à la `rustc`. There are two ways to get the
//! detailed diagnostics based on an error code: the [`Diagnostics`] type
//! itself (documentation only), and [`Error::explain`] (at runtime, behind
//! the `diagnostics` feature).

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod error_codes;

pub use error_codes::Diagnostics;
#[cfg(feature = "diagnostics")]
pub use error_codes::DIAGNOSTICS;
pub use miette::Result;

#[doc(hidden)]
#[macro_export]
macro_rules! as_item {
    ($item:item) => {
        $item
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! link_error_code {
    ($error_code:ident) => {
        concat!(
            "[`",
            stringify!($error_code),
            "`](ez80_errors::Diagnostics::",
            stringify!($error_code),
            ")."
        )
    };
}

/// Use this macro to declare a type that acts like a human-understandable
/// error, with diagnostics.
///
/// # Example
///
/// An example is better than a long text:
///
/// ```rust
/// use ez80_errors::error;
///
/// error! {
///     pub enum Error {
///         #[code = E000]
///         #[message = "The given error code is invalid."]
///         #[formatted_message("`{0}` is not a valid error code.")]
///         #[help = "Did you mistype the error code?"]
///         InvalidCode(String),
///     }
/// }
///
/// # fn main() {
/// let error = Error::InvalidCode("xyz".to_string());
///
/// assert_eq!(
///     error.to_string(),
///     "`xyz` is not a valid error code.".to_string()
/// );
///
/// use miette::Diagnostic;
///
/// assert_eq!(
///     error.code().map(|code| code.to_string()),
///     Some("E000".to_string())
/// );
/// # }
/// ```
///
/// This creates an `Error` enum type, with an `InvalidCode` tuple variant.
/// This newly created `Error` enum type implements [`thiserror::Error`] and
/// [`miette::Diagnostic`].
///
/// # Syntax
///
/// So far, the macro only supports an `enum` declaration, with unit or tuple
/// variants.
///
/// Each variant can have the following attributes:
///
/// * `#[cfg(…)]` (optional),
/// * `#[code = E...]` to define the error code (optional),
/// * `#[message = "…"]` a literal string message; used as documentation.
/// * `#[formatted_message("format {0} {}", .0.accessor)]` a "dynamic" string
///   message; used for the [`std::fmt::Display`] implementation, following
///   the same rules as the `#[error(…)]` attribute of [`thiserror`]
///   (optional).
/// * `#[help = "…"]` a help, a hint, a tip, to drive the user to a solution;
///   mandatory.
///
/// Alternatively, a variant annotated with `#[cfg(…)]` (optional) and
/// `#[transparent]` only forwards everything to the first tuple item of the
/// variant:
///
/// ```rust
/// use ez80_errors::error;
///
/// error! {
///     pub enum Error {
///         #[transparent]
///         Other(#[from] std::io::Error),
///     }
/// }
/// ```
#[macro_export]
macro_rules! error {
    // Error declaration with a static literal message.
    (
        @variant
        [ $( $declaration:tt )* ]
        [ $( $accumulator:tt )* ]
        $( #[cfg( $cfg:meta )] )*
        $( #[code = $error_code:ident] )?
        #[message = $error_message:expr]
        #[help = $error_help:literal]
        $( $tail:tt )*
    ) => {
        error! {
            @variant
            [ $( $declaration )* ]
            [
                $( $accumulator )*

                $(
                    #[doc = concat!("Error code: ", $crate::link_error_code!($error_code))]
                    #[doc = "\n"]
                )?
                #[doc = $error_message]
                #[error($error_message)]
                #[diagnostic(
                    $( code($error_code), )?
                    help($error_help),
                )]
                $( #[cfg( $cfg )] )*
            ]
            $( $tail )*
        }
    };

    // Error declaration with a dynamic message.
    (
        @variant
        [ $( $declaration:tt )* ]
        [ $( $accumulator:tt )* ]
        $( #[cfg( $cfg:meta )] )*
        $( #[code = $error_code:ident] )?
        #[message = $error_message:expr]
        #[formatted_message( $error_message_format:literal $( , . $error_message_arguments:expr )* $( , )* )]
        #[help = $error_help:literal]
        $( $tail:tt )*
    ) => {
        error! {
            @variant
            [ $( $declaration )* ]
            [
                $( $accumulator )*

                $(
                    #[doc = concat!("Error code: ", $crate::link_error_code!($error_code))]
                    #[doc = "\n"]
                )?
                #[doc = $error_message]
                #[error( $error_message_format $( , . $error_message_arguments ),* )]
                #[diagnostic(
                    $( code($error_code), )?
                    help($error_help),
                )]
                $( #[cfg( $cfg )] )*
            ]
            $( $tail )*
        }
    };

    // Transparent error.
    (
        @variant
        [ $( $declaration:tt )* ]
        [ $( $accumulator:tt )* ]
        $( #[cfg( $cfg:meta )] )*
        #[transparent]
        $( $tail:tt )*
    ) => {
        error! {
            @variant
            [ $( $declaration )* ]
            [
                $( $accumulator )*

                #[doc = "Transparent error. Please see the inner fields."]
                #[error(transparent)]
                $( #[cfg( $cfg )] )*
            ]
            $( $tail )*
        }
    };

    // Unit variant.
    (
        @variant
        [ $( $declaration:tt )* ]
        [ $( $accumulator:tt )* ]
        $variant_name:ident ,
        $( $tail:tt )*
    ) => {
        error! {
            @variant
            [ $( $declaration )* ]
            [
                $( $accumulator )*
                $variant_name,
            ]
            $( $tail )*
        }
    };

    // Tuple variant.
    (
        @variant
        [ $( $declaration:tt )* ]
        [ $( $accumulator:tt )* ]
        $variant_name:ident (
            $(
                $( #[ $field_meta:meta ] )*
                $field_visibility:vis $field_type:ty
            ),*
            $( , )?
        ) ,
        $( $tail:tt )*
    ) => {
        error! {
            @variant
            [ $( $declaration )* ]
            [
                $( $accumulator )*
                $variant_name (
                    $(
                        $( #[ $field_meta ] )*
                        $field_visibility $field_type,
                    )*
                ) ,
            ]
            $( $tail )*
        }
    };

    // End point.
    (
        @variant
        [ $( $declaration:tt )* ]
        [ $( $accumulator:tt )* ]
    ) => {
        $crate::as_item! {
            $( $declaration )* {
                $( $accumulator )*
            }
        }
    };

    // Entry point.
    (
        $( #[doc = $documentation:expr ] )*
        $visibility:vis enum $error_name:ident {
            $( $variants:tt )*
        }
    ) => {
        error! {
            @variant
            [
                $( #[doc = $documentation ] )*
                #[derive(Debug, thiserror::Error, miette::Diagnostic)]
                $visibility enum $error_name
            ]
            []
            $( $variants )*
        }
    };
}

// The `error!` macro generates links to `ez80_errors::Diagnostics::E...`. To
// avoid a warning when this `Error` type lives inside `ez80_errors` itself,
// alias `crate` to `ez80_errors`.
#[cfg(doc)]
use crate as ez80_errors;

error! {
    #[doc = "Error type for this crate."]
    #[doc = "\n"]
    #[doc = "The major interest of this type is its `Self::explain` method, used to"]
    #[doc = "fetch the diagnostic of a particular error code."]
    pub enum Error {
        #[code = E000]
        #[message = "The given error code is invalid."]
        #[formatted_message("`{0}` is not a valid error code.")]
        #[help = "Did you mistype the error code? The pattern is `E[0-9]{{3}}`, i.e. an `E` followed by 3 digits, such as `E000`."]
        InvalidCode(String),
    }
}

impl Error {
    /// Given a specific error code, this method returns the associated
    /// diagnostic, if the error exists.
    ///
    /// ```
    /// use ez80_errors::Error;
    ///
    /// # fn main() {
    /// assert!(Error::explain("E000").is_ok());
    /// assert!(Error::explain("oops").is_err());
    /// # }
    /// ```
    #[cfg(feature = "diagnostics")]
    pub fn explain(error_code: &str) -> Result<&'static str, Self> {
        DIAGNOSTICS
            .iter()
            .find_map(
                |(current_error_code, diagnostic)| {
                    if *current_error_code == error_code {
                        Some(*diagnostic)
                    } else {
                        None
                    }
                },
            )
            .ok_or(Self::InvalidCode(error_code.to_owned()))
    }
}
