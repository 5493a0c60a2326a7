//! Declarative named-state tables for node variants.
//!
//! Each node variant declares its closed state set together with a display
//! name per state, in one place. The table is purely for tracing - it never
//! affects scheduling.

/// Defines a state enum plus its display-name lookup from one pair list.
///
/// ```
/// proctree::state_table! {
///     pub enum LinkState {
///         Probe => "Probe",
///         Up => "Up",
///         Down => "Down",
///     }
/// }
///
/// assert_eq!(LinkState::Probe.name(), "Probe");
/// ```
#[macro_export]
macro_rules! state_table {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($state:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        $vis enum $name {
            $($state,)+
        }

        impl $name {
            /// Display name of this state, for tracing.
            $vis fn name(self) -> &'static str {
                match self {
                    $(Self::$state => $label,)+
                }
            }
        }
    };
}
