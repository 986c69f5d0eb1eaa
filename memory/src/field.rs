/// Prime Field Arithmetic over a Configurable Modulus
///
/// A circuit may mix several fields (e.g. a Mersenne-61 field next to a
/// 128-bit prime), so the modulus is a runtime value rather than a constant.
/// Residues are arbitrary precision and always kept canonical in `[0, p)`.
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use rand::Rng;

// ============================================================================
// Field
// ============================================================================

struct FieldParams {
    modulus: BigUint,
    /// p - 2, the Fermat inversion exponent.
    inv_exp: BigUint,
}

/// A prime field, identified by its modulus.
///
/// Cloning is cheap (shared handle). Two fields compare equal iff their
/// moduli are equal, regardless of which handle created them.
///
/// ```
/// use memory::Field;
///
/// let f = Field::new(97u32);
/// let a = f.from_u64(50);
/// let b = f.from_u64(60);
/// assert_eq!(a.add(&b), f.from_u64(13));
/// ```
#[derive(Clone)]
pub struct Field {
    params: Arc<FieldParams>,
}

impl Field {
    /// Create a field with the given modulus.
    ///
    /// The modulus must be prime for `inv`/`div` to be meaningful; this is
    /// not checked. A modulus below 2 is rejected.
    pub fn new(modulus: impl Into<BigUint>) -> Self {
        let modulus = modulus.into();
        assert!(
            modulus >= BigUint::from(2u32),
            "field modulus must be at least 2, got {modulus}"
        );
        let inv_exp = &modulus - BigUint::from(2u32);
        Self {
            params: Arc::new(FieldParams { modulus, inv_exp }),
        }
    }

    /// Parse a decimal modulus.
    pub fn from_modulus_str(s: &str) -> Option<Self> {
        let modulus = BigUint::parse_bytes(s.as_bytes(), 10)?;
        if modulus < BigUint::from(2u32) {
            return None;
        }
        Some(Self::new(modulus))
    }

    /// The prime modulus.
    pub fn modulus(&self) -> &BigUint {
        &self.params.modulus
    }

    /// Embed an unsigned integer, reducing it modulo p.
    pub fn elem(&self, value: impl Into<BigUint>) -> FieldElement {
        FieldElement {
            field: self.clone(),
            value: value.into() % self.modulus(),
        }
    }

    pub fn from_u64(&self, value: u64) -> FieldElement {
        self.elem(value)
    }

    /// Embed a signed integer; negative values wrap around (`-1` is `p - 1`).
    pub fn from_i64(&self, value: i64) -> FieldElement {
        self.from_bigint(&BigInt::from(value))
    }

    pub fn from_bigint(&self, value: &BigInt) -> FieldElement {
        let p = BigInt::from(self.modulus().clone());
        // mod_floor by a positive modulus is non-negative, so the sign is dropped
        let (_, value) = value.mod_floor(&p).into_parts();
        FieldElement {
            field: self.clone(),
            value,
        }
    }

    /// Parse a decimal literal and reduce it modulo p.
    pub fn from_decimal_str(&self, s: &str) -> Option<FieldElement> {
        let value = BigUint::parse_bytes(s.as_bytes(), 10)?;
        Some(self.elem(value))
    }

    pub fn zero(&self) -> FieldElement {
        self.elem(BigUint::zero())
    }

    pub fn one(&self) -> FieldElement {
        self.elem(BigUint::one())
    }

    /// Draw an element uniformly from `[0, p)`.
    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> FieldElement {
        FieldElement {
            field: self.clone(),
            value: rng.gen_biguint_below(self.modulus()),
        }
    }

    fn check(&self, other: &Field) {
        assert!(
            self == other,
            "mixed-field arithmetic: {self} and {other}"
        );
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.params, &other.params) || self.modulus() == other.modulus()
    }
}

impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.modulus().hash(state);
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F_p({})", self.modulus())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F_p({})", self.modulus())
    }
}

// ============================================================================
// FieldElement
// ============================================================================

/// An element of a prime field. Immutable: every operation returns a new value.
#[derive(Clone)]
pub struct FieldElement {
    field: Field,
    value: BigUint,
}

impl FieldElement {
    /// The field this element belongs to.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// The canonical residue in `[0, p)`.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    #[inline]
    pub fn is_one(&self) -> bool {
        self.value.is_one()
    }

    /// The residue as a `u64`, if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        self.value.to_u64()
    }

    fn with_value(&self, value: BigUint) -> Self {
        Self {
            field: self.field.clone(),
            value,
        }
    }

    /// Modular addition: (self + other) mod p.
    ///
    /// ```
    /// use memory::Field;
    ///
    /// let f = Field::new(7u32);
    /// assert_eq!(f.from_u64(5).add(&f.from_u64(4)), f.from_u64(2));
    /// ```
    pub fn add(&self, other: &Self) -> Self {
        self.field.check(&other.field);
        self.with_value((&self.value + &other.value) % self.field.modulus())
    }

    /// Modular subtraction: (self - other) mod p.
    pub fn sub(&self, other: &Self) -> Self {
        self.field.check(&other.field);
        let p = self.field.modulus();
        self.with_value((&self.value + p - &other.value) % p)
    }

    /// Modular multiplication: (self * other) mod p.
    pub fn mul(&self, other: &Self) -> Self {
        self.field.check(&other.field);
        self.with_value((&self.value * &other.value) % self.field.modulus())
    }

    /// Modular negation: (-self) mod p.
    pub fn neg(&self) -> Self {
        let p = self.field.modulus();
        self.with_value((p - &self.value) % p)
    }

    /// Modular exponentiation.
    pub fn pow(&self, exp: &BigUint) -> Self {
        self.with_value(self.value.modpow(exp, self.field.modulus()))
    }

    /// Modular inverse via Fermat's little theorem (self^(p−2) mod p).
    ///
    /// Only meaningful for a prime modulus. Zero maps to zero.
    ///
    /// ```
    /// use memory::Field;
    ///
    /// let f = Field::new(2305843009213693951u64);
    /// let a = f.from_u64(5);
    /// assert!(a.mul(&a.inv()).is_one());
    /// ```
    pub fn inv(&self) -> Self {
        self.pow(&self.field.params.inv_exp)
    }

    /// Modular division: self * other⁻¹.
    pub fn div(&self, other: &Self) -> Self {
        self.mul(&other.inv())
    }

    pub fn to_decimal_string(&self) -> String {
        self.value.to_str_radix(10)
    }
}

impl PartialEq for FieldElement {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for FieldElement {}

impl Hash for FieldElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({})", self.value)
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

// ============================================================================
// Tests
// ============================================================================
