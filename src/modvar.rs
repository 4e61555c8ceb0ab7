//! Override slots for protocol fields.
//!
//! Every field an engine computes (a MAC, a length, a nonce, a flags byte) is stored as a
//! [`Modifiable`]. The engine writes the *computed* value and then reads back the value
//! with all registered modifications applied, so callers can corrupt any field in a
//! controlled way without the engine knowing about it.
//!
//! Structs holding such fields implement [`FieldRegistry`], an explicit name → field
//! table. [`apply_overrides`] walks a list of named [`Override`]s through that table.

use std::fmt;

use crate::Error;

/// Modification of a byte-array field.
///
/// Indices past the end are clamped, so applying a modification never panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BytesModification {
    /// Replace the value.
    Explicit(Vec<u8>),
    /// XOR `mask` into the value starting at `start`. Bytes past the end are ignored.
    Xor { mask: Vec<u8>, start: usize },
    Insert { bytes: Vec<u8>, start: usize },
    Delete { start: usize, count: usize },
    /// Value followed by itself.
    Duplicate,
    Append(Vec<u8>),
    Prepend(Vec<u8>),
}

impl BytesModification {
    fn apply(&self, value: &[u8]) -> Vec<u8> {
        match self {
            BytesModification::Explicit(v) => v.clone(),
            BytesModification::Xor { mask, start } => {
                let mut out = value.to_vec();
                let start = (*start).min(out.len());
                for (b, m) in out[start..].iter_mut().zip(mask) {
                    *b ^= *m;
                }
                out
            }
            BytesModification::Insert { bytes, start } => {
                let start = (*start).min(value.len());
                let mut out = Vec::with_capacity(value.len() + bytes.len());
                out.extend_from_slice(&value[..start]);
                out.extend_from_slice(bytes);
                out.extend_from_slice(&value[start..]);
                out
            }
            BytesModification::Delete { start, count } => {
                let start = (*start).min(value.len());
                let end = start.saturating_add(*count).min(value.len());
                let mut out = value[..start].to_vec();
                out.extend_from_slice(&value[end..]);
                out
            }
            BytesModification::Duplicate => {
                let mut out = value.to_vec();
                out.extend_from_slice(value);
                out
            }
            BytesModification::Append(bytes) => {
                let mut out = value.to_vec();
                out.extend_from_slice(bytes);
                out
            }
            BytesModification::Prepend(bytes) => {
                let mut out = bytes.clone();
                out.extend_from_slice(value);
                out
            }
        }
    }
}

/// Modification of an integer field. Arithmetic wraps at the field width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntModification {
    Explicit(u64),
    Add(u64),
    Sub(u64),
    Xor(u64),
    ShiftLeft(u32),
    ShiftRight(u32),
}

impl IntModification {
    fn apply(&self, value: u64) -> u64 {
        match *self {
            IntModification::Explicit(v) => v,
            IntModification::Add(v) => value.wrapping_add(v),
            IntModification::Sub(v) => value.wrapping_sub(v),
            IntModification::Xor(v) => value ^ v,
            IntModification::ShiftLeft(n) => value.checked_shl(n).unwrap_or(0),
            IntModification::ShiftRight(n) => value.checked_shr(n).unwrap_or(0),
        }
    }
}

/// Value types that can live in a [`Modifiable`].
pub trait Modify: Clone + fmt::Debug {
    type Modification: Clone + fmt::Debug + PartialEq + Eq;

    /// Apply one modification. `value` is `None` when nothing was computed yet; only an
    /// explicit modification can produce a value from nothing.
    fn modify(value: Option<&Self>, m: &Self::Modification) -> Option<Self>;
}

impl Modify for Vec<u8> {
    type Modification = BytesModification;

    fn modify(value: Option<&Self>, m: &BytesModification) -> Option<Self> {
        match (value, m) {
            (_, BytesModification::Explicit(v)) => Some(v.clone()),
            (Some(v), m) => Some(m.apply(v)),
            (None, _) => None,
        }
    }
}

macro_rules! int_modify {
    ($($t:ty),*) => {
        $(
            impl Modify for $t {
                type Modification = IntModification;

                fn modify(value: Option<&Self>, m: &IntModification) -> Option<Self> {
                    match (value, m) {
                        // Truncation to the field width is intended.
                        (_, IntModification::Explicit(v)) => Some(*v as $t),
                        (Some(v), m) => Some(m.apply(*v as u64) as $t),
                        (None, _) => None,
                    }
                }
            }
        )*
    };
}

int_modify!(u8, u16, u32, u64);

/// How a field's current value came to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    Unset,
    Computed(T),
    Overridden(T),
}

impl<T> Resolved<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Resolved::Unset => None,
            Resolved::Computed(v) | Resolved::Overridden(v) => Some(v),
        }
    }
}

/// A field slot holding a computed value plus the modifications applied on read.
#[derive(Clone, PartialEq, Eq)]
pub struct Modifiable<T: Modify> {
    original: Option<T>,
    modifications: Vec<T::Modification>,
}

impl<T: Modify> Default for Modifiable<T> {
    fn default() -> Self {
        Modifiable {
            original: None,
            modifications: Vec::new(),
        }
    }
}

impl<T: Modify> Modifiable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that already carries a computed value.
    pub fn with_value(value: T) -> Self {
        Modifiable {
            original: Some(value),
            modifications: Vec::new(),
        }
    }

    /// Store the computed value. Registered modifications are kept.
    pub fn set(&mut self, value: T) {
        self.original = Some(value);
    }

    /// Store the computed value and return what readers will see.
    pub fn compute(&mut self, value: T) -> T {
        let mut v = value.clone();
        for m in &self.modifications {
            if let Some(next) = T::modify(Some(&v), m) {
                v = next;
            }
        }
        self.original = Some(value);
        v
    }

    /// Forget the computed value, keeping modifications.
    pub fn clear(&mut self) {
        self.original = None;
    }

    /// Computed value with modifications applied.
    pub fn value(&self) -> Option<T> {
        let mut v = self.original.clone();
        for m in &self.modifications {
            v = T::modify(v.as_ref(), m);
        }
        v
    }

    /// Computed value, ignoring modifications.
    pub fn original(&self) -> Option<&T> {
        self.original.as_ref()
    }

    pub fn resolved(&self) -> Resolved<T> {
        match (self.value(), self.modifications.is_empty()) {
            (None, _) => Resolved::Unset,
            (Some(v), true) => Resolved::Computed(v),
            (Some(v), false) => Resolved::Overridden(v),
        }
    }

    pub fn is_set(&self) -> bool {
        self.value().is_some()
    }

    pub fn add_modification(&mut self, m: T::Modification) {
        self.modifications.push(m);
    }

    pub fn modifications(&self) -> &[T::Modification] {
        &self.modifications
    }

    pub fn clear_modifications(&mut self) {
        self.modifications.clear();
    }
}

impl<T: Modify + Default> Modifiable<T> {
    /// Current value or `T::default()` when unset.
    pub fn value_or_default(&self) -> T {
        self.value().unwrap_or_default()
    }
}

impl<T: Modify> fmt::Debug for Modifiable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolved() {
            Resolved::Unset => write!(f, "Unset"),
            Resolved::Computed(v) => write!(f, "{:?}", v),
            Resolved::Overridden(v) => write!(f, "{:?} (overridden)", v),
        }
    }
}

impl<T: Modify> From<T> for Modifiable<T> {
    fn from(value: T) -> Self {
        Modifiable::with_value(value)
    }
}

/// Mutable access to one registered field.
pub enum FieldMut<'a> {
    Bytes(&'a mut Modifiable<Vec<u8>>),
    U8(&'a mut Modifiable<u8>),
    U16(&'a mut Modifiable<u16>),
    U32(&'a mut Modifiable<u32>),
    U64(&'a mut Modifiable<u64>),
}

/// Any modification, typed by the field family it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    Bytes(BytesModification),
    Int(IntModification),
}

impl From<BytesModification> for Modification {
    fn from(value: BytesModification) -> Self {
        Modification::Bytes(value)
    }
}

impl From<IntModification> for Modification {
    fn from(value: IntModification) -> Self {
        Modification::Int(value)
    }
}

/// A modification addressed to a field by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub field: String,
    pub modification: Modification,
}

impl Override {
    pub fn new(field: impl Into<String>, modification: impl Into<Modification>) -> Self {
        Override {
            field: field.into(),
            modification: modification.into(),
        }
    }
}

/// Explicit name → field table.
pub trait FieldRegistry {
    /// Every name `field_mut` answers to.
    fn field_names(&self) -> &'static [&'static str];

    fn field_mut(&mut self, name: &str) -> Option<FieldMut<'_>>;
}

/// Register each override on the named field of `target`.
///
/// Stops at the first unknown name or type mismatch; earlier overrides stay applied.
pub fn apply_overrides<R>(target: &mut R, overrides: &[Override]) -> Result<(), Error>
where
    R: FieldRegistry + ?Sized,
{
    for o in overrides {
        let Some(field) = target.field_mut(&o.field) else {
            return Err(Error::UnknownField(o.field.clone()));
        };

        match (field, &o.modification) {
            (FieldMut::Bytes(f), Modification::Bytes(m)) => f.add_modification(m.clone()),
            (FieldMut::U8(f), Modification::Int(m)) => f.add_modification(*m),
            (FieldMut::U16(f), Modification::Int(m)) => f.add_modification(*m),
            (FieldMut::U32(f), Modification::Int(m)) => f.add_modification(*m),
            (FieldMut::U64(f), Modification::Int(m)) => f.add_modification(*m),
            _ => return Err(Error::FieldTypeMismatch(o.field.clone())),
        }

        trace!("Override registered on {}: {:?}", o.field, o.modification);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_modifications() {
        let v = vec![1, 2, 3, 4];
        let xor = BytesModification::Xor {
            mask: vec![0xff, 0xff, 0xff],
            start: 2,
        };
        assert_eq!(xor.apply(&v), vec![1, 2, 0xfc, 0xfb]);

        let ins = BytesModification::Insert {
            bytes: vec![9],
            start: 10,
        };
        assert_eq!(ins.apply(&v), vec![1, 2, 3, 4, 9]);

        let del = BytesModification::Delete { start: 1, count: 2 };
        assert_eq!(del.apply(&v), vec![1, 4]);

        let del = BytesModification::Delete {
            start: 3,
            count: usize::MAX,
        };
        assert_eq!(del.apply(&v), vec![1, 2, 3]);

        assert_eq!(BytesModification::Duplicate.apply(&v).len(), 8);
    }

    #[test]
    fn int_modifications_wrap_at_width() {
        let mut m: Modifiable<u8> = Modifiable::with_value(250);
        m.add_modification(IntModification::Add(10));
        assert_eq!(m.value(), Some(4));

        let mut m: Modifiable<u16> = Modifiable::with_value(1);
        m.add_modification(IntModification::ShiftLeft(80));
        assert_eq!(m.value(), Some(0));
    }

    #[test]
    fn resolved_states() {
        let mut m: Modifiable<Vec<u8>> = Modifiable::new();
        assert_eq!(m.resolved(), Resolved::Unset);

        // Non-explicit modifications need a computed value.
        m.add_modification(BytesModification::Duplicate);
        assert_eq!(m.resolved(), Resolved::Unset);

        assert_eq!(m.compute(vec![7]), vec![7, 7]);
        assert_eq!(m.original(), Some(&vec![7]));
        assert_eq!(m.resolved(), Resolved::Overridden(vec![7, 7]));

        m.clear_modifications();
        assert_eq!(m.resolved(), Resolved::Computed(vec![7]));
    }

    #[test]
    fn explicit_fills_unset_slot() {
        let mut m: Modifiable<u32> = Modifiable::new();
        m.add_modification(IntModification::Explicit(0x1_0000_0005));
        assert_eq!(m.value(), Some(5));
    }

    struct Two {
        a: Modifiable<Vec<u8>>,
        b: Modifiable<u16>,
    }

    impl FieldRegistry for Two {
        fn field_names(&self) -> &'static [&'static str] {
            &["a", "b"]
        }

        fn field_mut(&mut self, name: &str) -> Option<FieldMut<'_>> {
            match name {
                "a" => Some(FieldMut::Bytes(&mut self.a)),
                "b" => Some(FieldMut::U16(&mut self.b)),
                _ => None,
            }
        }
    }

    #[test]
    fn overrides_by_name() {
        let mut t = Two {
            a: Modifiable::with_value(vec![0]),
            b: Modifiable::with_value(1),
        };

        apply_overrides(
            &mut t,
            &[
                Override::new("a", BytesModification::Append(vec![1])),
                Override::new("b", IntModification::Add(1)),
            ],
        )
        .unwrap();

        assert_eq!(t.a.value(), Some(vec![0, 1]));
        assert_eq!(t.b.value(), Some(2));

        let err = apply_overrides(&mut t, &[Override::new("c", IntModification::Add(1))]);
        assert_eq!(err, Err(Error::UnknownField("c".into())));

        let err = apply_overrides(&mut t, &[Override::new("a", IntModification::Add(1))]);
        assert_eq!(err, Err(Error::FieldTypeMismatch("a".into())));
    }
}
