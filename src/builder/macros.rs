//! Macros for ergonomic state machine construction.

/// Generate a `StateKind` enum.
///
/// # Example
///
/// ```
/// use statehold::core::StateKind;
/// use statehold::state_kinds;
///
/// state_kinds! {
///     pub enum OrderState {
///         Root,
///         Open,
///         New,
///         Paid,
///     }
/// }
///
/// assert_eq!(OrderState::Paid.name(), "Paid");
/// ```
#[macro_export]
macro_rules! state_kinds {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $crate::core::StateKind for $name {
            fn name(&self) -> &str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }
        }
    };
}
