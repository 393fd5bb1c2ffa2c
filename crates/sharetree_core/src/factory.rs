//! Tag-keyed element construction.

use crate::element::ElementBody;
use crate::error::{CoreError, CoreResult};
use sharetree_codec::{TypedValue, ValueKind};
use sharetree_protocol::ElementKind;
use std::collections::HashMap;

/// Builds an element body from an optional starting value.
pub type ElementMaker = fn(Option<TypedValue>) -> CoreResult<ElementBody>;

/// Maps element kind tags to constructors.
///
/// Registering a tag that is already present replaces the previous
/// constructor.
#[derive(Clone)]
pub struct ElementFactory {
    makers: HashMap<u8, ElementMaker>,
}

impl ElementFactory {
    /// Creates a factory with no registrations.
    pub fn empty() -> Self {
        Self {
            makers: HashMap::new(),
        }
    }

    /// Creates a factory with every built-in element kind registered.
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register(ElementKind::Bool.to_code(), |v| scalar(ValueKind::Bool, v));
        factory.register(ElementKind::Int32.to_code(), |v| scalar(ValueKind::Int32, v));
        factory.register(ElementKind::Int64.to_code(), |v| scalar(ValueKind::Int64, v));
        factory.register(ElementKind::Float32.to_code(), |v| scalar(ValueKind::Float32, v));
        factory.register(ElementKind::Float64.to_code(), |v| scalar(ValueKind::Float64, v));
        factory.register(ElementKind::String.to_code(), |v| scalar(ValueKind::String, v));
        factory.register(ElementKind::Object.to_code(), object);
        factory.register(ElementKind::Int32Array.to_code(), array);
        factory.register(ElementKind::Float32Array.to_code(), array);
        factory.register(ElementKind::StringArray.to_code(), array);
        factory
    }

    /// Registers a constructor for `tag`, replacing any existing one.
    pub fn register(&mut self, tag: u8, maker: ElementMaker) {
        self.makers.insert(tag, maker);
    }

    /// Returns whether `tag` has a constructor.
    pub fn is_registered(&self, tag: u8) -> bool {
        self.makers.contains_key(&tag)
    }

    /// Builds the body of an element of kind `tag`.
    ///
    /// # Errors
    ///
    /// `UnknownKind` if nothing is registered for `tag`; `KindMismatch` if
    /// the starting value does not fit the kind.
    pub fn create(&self, tag: u8, starting_value: Option<TypedValue>) -> CoreResult<(ElementKind, ElementBody)> {
        let maker = self.makers.get(&tag).ok_or(CoreError::UnknownKind { tag })?;
        let kind = ElementKind::from_code(tag).ok_or(CoreError::UnknownKind { tag })?;
        Ok((kind, maker(starting_value)?))
    }
}

impl Default for ElementFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn scalar(kind: ValueKind, value: Option<TypedValue>) -> CoreResult<ElementBody> {
    match value {
        None => Ok(ElementBody::Scalar(TypedValue::default_for(kind))),
        Some(v) if v.kind() == kind => Ok(ElementBody::Scalar(v)),
        Some(v) => Err(CoreError::kind_mismatch(kind, v.kind())),
    }
}

fn object(value: Option<TypedValue>) -> CoreResult<ElementBody> {
    let object_type = match value {
        None => String::new(),
        Some(TypedValue::String(s)) => s,
        Some(v) => return Err(CoreError::kind_mismatch(ValueKind::String, v.kind())),
    };
    Ok(ElementBody::Object {
        object_type,
        children: Vec::new(),
    })
}

fn array(value: Option<TypedValue>) -> CoreResult<ElementBody> {
    match value {
        None => Ok(ElementBody::Array(Vec::new())),
        Some(v) => Err(CoreError::kind_mismatch("no starting value", v.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_registered() {
        let factory = ElementFactory::new();
        for kind in ElementKind::ALL {
            assert!(factory.is_registered(kind.to_code()), "{kind}");
        }
    }

    #[test]
    fn scalar_defaults_and_validates() {
        let factory = ElementFactory::new();
        let (kind, body) = factory.create(ElementKind::Int32.to_code(), None).unwrap();
        assert_eq!(kind, ElementKind::Int32);
        assert_eq!(body, ElementBody::Scalar(TypedValue::Int32(0)));

        let err = factory
            .create(ElementKind::Int32.to_code(), Some(TypedValue::Bool(true)))
            .unwrap_err();
        assert!(matches!(err, CoreError::KindMismatch { .. }));
    }

    #[test]
    fn object_takes_type_string() {
        let (_, body) = ElementFactory::new()
            .create(ElementKind::Object.to_code(), Some(TypedValue::from("player")))
            .unwrap();
        assert!(matches!(body, ElementBody::Object { ref object_type, .. } if object_type == "player"));
    }

    #[test]
    fn arrays_start_empty() {
        let factory = ElementFactory::new();
        let (_, body) = factory.create(ElementKind::StringArray.to_code(), None).unwrap();
        assert_eq!(body, ElementBody::Array(Vec::new()));
        assert!(factory
            .create(ElementKind::StringArray.to_code(), Some(TypedValue::from("x")))
            .is_err());
    }

    #[test]
    fn unknown_tag() {
        assert_eq!(
            ElementFactory::new().create(99, None),
            Err(CoreError::UnknownKind { tag: 99 })
        );
        assert_eq!(
            ElementFactory::empty().create(ElementKind::Bool.to_code(), None),
            Err(CoreError::UnknownKind { tag: 1 })
        );
    }

    #[test]
    fn registration_is_last_wins() {
        let mut factory = ElementFactory::new();
        factory.register(ElementKind::Bool.to_code(), |_| {
            Ok(ElementBody::Scalar(TypedValue::Bool(true)))
        });
        let (_, body) = factory.create(ElementKind::Bool.to_code(), None).unwrap();
        assert_eq!(body, ElementBody::Scalar(TypedValue::Bool(true)));
    }
}
