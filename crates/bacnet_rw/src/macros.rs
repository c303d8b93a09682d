//! Declarative helpers for BACnet enumerations.

/// Declares a BACnet enumeration with its wire codes and camelCase names.
///
/// Codes outside the listed members are kept in an `Unlisted` variant so that
/// vendor extensions and newer protocol revisions survive a round trip.
macro_rules! bacnet_enumeration {
    (
        $(#[$meta:meta])*
        pub enum $name:ident: $repr:ty {
            $($variant:ident = $code:literal => $text:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant,)+
            /// Code outside the known members
            Unlisted($repr),
        }

        impl $name {
            /// Wire code of this member
            pub fn code(self) -> $repr {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Unlisted(code) => code,
                }
            }

            /// Member for a wire code, `Unlisted` when the code is not listed
            pub fn from_code(code: $repr) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    code => Self::Unlisted(code),
                }
            }

            /// Symbolic name, if the code is a known member
            pub fn name(self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => Some($text),)+
                    Self::Unlisted(_) => None,
                }
            }

            /// Member for a symbolic name
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.name() {
                    Some(name) => f.write_str(name),
                    None => write!(f, "{}", self.code()),
                }
            }
        }
    };
}
