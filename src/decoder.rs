use num_traits::{FromPrimitive as _, ToPrimitive as _};

/// The strategy used to interpret the raw register words of a parameter.
///
/// Catalogs select a decoder with a small integer rule code. Codes without a dedicated decoder
/// select [`Decoder::Debug`], which hands the register words over untouched, so that a catalog
/// can declare new register types before anything knows how to decode them.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::IntoStaticStr,
    strum::Display,
    strum::VariantArray,
    num_derive::FromPrimitive,
    num_derive::ToPrimitive,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Decoder {
    /// Passthrough of the raw register words, for inspection.
    Debug = 0,
    /// Big-endian number spread over one or more registers.
    Number = 1,
    /// Number with its register words stored in swapped order.
    SwappedNumber = 3,
    /// ASCII text packed two characters per register.
    String = 5,
}

impl Decoder {
    pub fn from_rule(rule: i64) -> Self {
        match Self::from_i64(rule) {
            Some(Self::Debug) | None => Self::Debug,
            Some(decoder) => decoder,
        }
    }

    /// The rule code selecting this decoder.
    ///
    /// `Debug` has none: it is what every unrecognized code selects.
    pub fn rule(self) -> Option<i64> {
        match self {
            Self::Debug => None,
            decoder => decoder.to_i64(),
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::Decoder;

    #[test]
    fn known_rules() {
        assert_eq!(Decoder::from_rule(1), Decoder::Number);
        assert_eq!(Decoder::from_rule(3), Decoder::SwappedNumber);
        assert_eq!(Decoder::from_rule(5), Decoder::String);
    }

    #[test]
    fn unknown_rules_fall_back_to_debug() {
        for rule in [0, 2, 4, 6, 99, -1, i64::MAX, i64::MIN] {
            assert_eq!(Decoder::from_rule(rule), Decoder::Debug, "rule {rule}");
        }
    }

    #[test]
    fn rule_codes_round_trip() {
        for &decoder in <Decoder as strum::VariantArray>::VARIANTS {
            match decoder.rule() {
                Some(rule) => assert_eq!(Decoder::from_rule(rule), decoder),
                None => assert_eq!(decoder, Decoder::Debug),
            }
        }
    }

    #[test]
    fn names() {
        assert_eq!(Decoder::Number.name(), "number");
        assert_eq!(Decoder::SwappedNumber.to_string(), "swapped-number");
        assert_eq!(Decoder::String.name(), "string");
        assert_eq!(Decoder::Debug.name(), "debug");
    }
}
