//! String-valued service enums with a forward-compatible `Unknown` variant.

use crate::error::Error;

/// Common view over enums declared with [`oci_enum!`](crate::oci_enum).
pub trait OciEnum {
    fn as_str(&self) -> &str;
    fn is_known(&self) -> bool;
    fn supported_values() -> &'static [&'static str];
}

/// Appends a message to `errors` when `value` is outside the known set.
pub fn validate_enum<E: OciEnum>(field: &str, value: Option<&E>, errors: &mut Vec<String>) {
    let Some(value) = value else {
        return;
    };
    if value.is_known() {
        return;
    }
    errors.push(format!(
        "unsupported enum value for {field}: {}. Supported values are: {}.",
        value.as_str(),
        E::supported_values().join(",")
    ));
}

/// Folds collected validation messages into one error, newline separated.
pub fn enum_validation_error(operation: &str, errors: Vec<String>) -> Option<Error> {
    if errors.is_empty() {
        return None;
    }
    Some(Error::InvalidEnumValue {
        operation: operation.to_owned(),
        message: errors.join("\n"),
    })
}

/// Declares a wire enum.
///
/// Parsing is case-insensitive, serialization always uses the canonical
/// spelling, and unrecognised wire values land in `Unknown` instead of failing.
///
/// ```
/// oci_transport::oci_enum! {
///     pub enum SortOrder {
///         Asc => "ASC",
///         Desc => "DESC",
///     }
/// }
///
/// assert_eq!(SortOrder::parse("asc"), SortOrder::Asc);
/// assert!(!SortOrder::parse("sideways").is_known());
/// ```
#[macro_export]
macro_rules! oci_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$variant_meta:meta])* $variant:ident => $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$variant_meta])* $variant,)+
            Unknown(::std::string::String),
        }

        impl $name {
            pub const VALUES: &'static [&'static str] = &[$($value),+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $value,)+
                    Self::Unknown(value) => value.as_str(),
                }
            }

            pub fn parse(value: &str) -> Self {
                $(
                    if value.eq_ignore_ascii_case($value) {
                        return Self::$variant;
                    }
                )+
                Self::Unknown(value.to_owned())
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Unknown(_))
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                formatter.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::std::convert::Infallible;

            fn from_str(value: &str) -> ::std::result::Result<Self, Self::Err> {
                Ok(Self::parse(value))
            }
        }

        impl $crate::__private::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: $crate::__private::serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> $crate::__private::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: $crate::__private::serde::Deserializer<'de>,
            {
                let value = <::std::string::String as $crate::__private::serde::Deserialize>::deserialize(
                    deserializer,
                )?;
                Ok(Self::parse(&value))
            }
        }

        impl $crate::binding::ParamValue for $name {
            fn to_param(&self) -> ::std::string::String {
                self.as_str().to_owned()
            }
        }

        impl $crate::enums::OciEnum for $name {
            fn as_str(&self) -> &str {
                $name::as_str(self)
            }

            fn is_known(&self) -> bool {
                $name::is_known(self)
            }

            fn supported_values() -> &'static [&'static str] {
                Self::VALUES
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::{enum_validation_error, validate_enum};
    use crate::binding::ParamValue;
    use crate::error::ErrorCode;

    crate::oci_enum! {
        pub enum Shade {
            Light => "LIGHT",
            DarkGrey => "DARK_GREY",
        }
    }

    #[test]
    fn parsing_ignores_case_and_keeps_unknown_values() {
        assert_eq!(Shade::parse("dark_grey"), Shade::DarkGrey);
        assert_eq!(Shade::parse("Light"), Shade::Light);
        assert_eq!(Shade::parse("NEON"), Shade::Unknown("NEON".to_owned()));
        assert_eq!(Shade::parse("NEON").to_string(), "NEON");
        assert_eq!(Shade::DarkGrey.to_param(), "DARK_GREY");
    }

    #[test]
    fn serde_uses_canonical_spelling_and_tolerates_new_values() {
        let decoded: Vec<Shade> =
            serde_json::from_str(r#"["light","DARK_GREY","ULTRAVIOLET"]"#).expect("decode");
        assert_eq!(
            decoded,
            vec![
                Shade::Light,
                Shade::DarkGrey,
                Shade::Unknown("ULTRAVIOLET".to_owned())
            ]
        );
        assert_eq!(
            serde_json::to_string(&Shade::Light).expect("encode"),
            r#""LIGHT""#
        );
    }

    #[test]
    fn validation_lists_supported_values_per_field() {
        let mut errors = Vec::new();
        validate_enum("Shade", Some(&Shade::parse("neon")), &mut errors);
        validate_enum("Tint", Some(&Shade::Light), &mut errors);
        validate_enum::<Shade>("Other", None, &mut errors);
        validate_enum("Backdrop", Some(&Shade::parse("plaid")), &mut errors);
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[0],
            "unsupported enum value for Shade: neon. Supported values are: LIGHT,DARK_GREY."
        );

        let error = enum_validation_error("ListVolumes", errors).expect("invalid");
        assert_eq!(error.code(), ErrorCode::InvalidEnumValue);
        assert!(error.to_string().contains("neon"));
        assert!(error.to_string().contains("\n"));
        assert!(enum_validation_error("ListVolumes", Vec::new()).is_none());
    }
}
