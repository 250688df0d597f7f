//! Declarative macros to reduce boilerplate across the mcareg codebase

/// Define a metric enum with automatic `name()` and `all()` implementations
///
/// # Example
/// ```
/// use mcareg::metric_enum;
///
/// metric_enum! {
///     pub enum LinkMetric {
///         Retries => "mcareg_link_retries_total",
///         Stalls => "mcareg_link_stalls_total",
///     }
/// }
///
/// let metric = LinkMetric::Retries;
/// assert_eq!(metric.name(), "mcareg_link_retries_total");
/// assert_eq!(LinkMetric::all().len(), 2);
/// ```
#[macro_export]
macro_rules! metric_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $str:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }
        }
    };
}

/// Define an enum with name() and all() methods, plus custom data per variant
///
/// # Example
/// ```
/// use mcareg::enum_with_data;
///
/// enum_with_data! {
///     pub enum Sensor: f64 {
///         Pmt => ("pmt", 100.0),
///         Sipm => ("sipm", 10.0),
///     }
///     impl base_impedance -> f64
/// }
///
/// let sensor = Sensor::Pmt;
/// assert_eq!(sensor.name(), "pmt");
/// assert_eq!(sensor.base_impedance(), 100.0);
/// ```
#[macro_export]
macro_rules! enum_with_data {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident: $data_type:ty {
            $($variant:ident => ($str:literal, $data:expr)),* $(,)?
        }
        impl $method:ident -> $return_type:ty
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            pub fn $method(&self) -> $return_type {
                match self {
                    $($name::$variant => $data,)*
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }
        }
    };
}
