//! Per-field policy for transit sealing.

use std::fmt;
use std::str::FromStr;

/// An output field of a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Name,
    Email,
    Role,
    CreatedAt,
}

impl Field {
    /// All fields, in output order.
    pub const ALL: [Self; 5] = [Self::Id, Self::Name, Self::Email, Self::Role, Self::CreatedAt];

    /// Returns the field name as it appears in output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Email => "email",
            Self::Role => "role",
            Self::CreatedAt => "created_at",
        }
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown field: {s}"))
    }
}

/// Which output fields are sealed under the recipient key.
///
/// The default seals `id`, `name`, `email` and `role` and leaves
/// `created_at` in the clear.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TransitPolicy(u8);

impl Default for TransitPolicy {
    fn default() -> Self {
        Self::none().seal(Field::Id).seal(Field::Name).seal(Field::Email).seal(Field::Role)
    }
}

impl TransitPolicy {
    /// Seals nothing.
    #[must_use]
    pub const fn none() -> Self {
        Self(0)
    }

    /// Seals every field.
    #[must_use]
    pub const fn all() -> Self {
        Self(0b1_1111)
    }

    /// Seals only the fields that hold personal data.
    #[must_use]
    pub const fn secrets_only() -> Self {
        Self::none().seal(Field::Name).seal(Field::Email)
    }

    /// Adds `field` to the sealed set.
    #[must_use]
    pub const fn seal(mut self, field: Field) -> Self {
        self.0 |= field.bit();
        self
    }

    /// Removes `field` from the sealed set.
    #[must_use]
    pub const fn pass(mut self, field: Field) -> Self {
        self.0 &= !field.bit();
        self
    }

    /// Returns `true` if `field` is sealed.
    #[must_use]
    pub const fn seals(self, field: Field) -> bool {
        self.0 & field.bit() != 0
    }
}

impl fmt::Debug for TransitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(Field::ALL.into_iter().filter(|field| self.seals(*field))).finish()
    }
}
