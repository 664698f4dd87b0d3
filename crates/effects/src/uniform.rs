use std::collections::BTreeMap;

/// Named values an effect hands to the active backend for one frame.
pub type EffectParameters = BTreeMap<String, UniformValue>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([f32; 16]),
}

impl UniformValue {
    /// Picks the variant from the number of components: 1, 2, 3, 4 or 16.
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match *values {
            [x] => Some(Self::Float(x)),
            [x, y] => Some(Self::Vec2([x, y])),
            [x, y, z] => Some(Self::Vec3([x, y, z])),
            [x, y, z, w] => Some(Self::Vec4([x, y, z, w])),
            _ if values.len() == 16 => {
                let mut matrix = [0.0; 16];
                matrix.copy_from_slice(values);
                Some(Self::Mat4(matrix))
            }
            _ => None,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Float(_) | Self::Int(_) => 1,
            Self::Vec2(_) => 2,
            Self::Vec3(_) => 3,
            Self::Vec4(_) => 4,
            Self::Mat4(_) => 16,
        }
    }

    pub fn components(&self) -> Vec<f32> {
        match self {
            Self::Float(x) => vec![*x],
            Self::Int(x) => vec![*x as f32],
            Self::Vec2(v) => v.to_vec(),
            Self::Vec3(v) => v.to_vec(),
            Self::Vec4(v) => v.to_vec(),
            Self::Mat4(m) => m.to_vec(),
        }
    }

    /// Component-wise interpolation between two values of the same shape.
    pub fn lerp(&self, other: &Self, t: f32) -> Option<Self> {
        if self.arity() != other.arity() {
            return None;
        }
        if let (Self::Int(a), Self::Int(b)) = (self, other) {
            let value = *a as f32 + (*b - *a) as f32 * t;
            return Some(Self::Int(value.round() as i32));
        }
        let blended: Vec<f32> = self
            .components()
            .iter()
            .zip(other.components())
            .map(|(a, b)| a + (b - a) * t)
            .collect();
        Self::from_slice(&blended)
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        Self::Vec2(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        Self::Vec3(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        Self::Vec4(value)
    }
}

impl From<[f32; 16]> for UniformValue {
    fn from(value: [f32; 16]) -> Self {
        Self::Mat4(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_on_arity() {
        assert_eq!(UniformValue::from_slice(&[0.5]), Some(UniformValue::Float(0.5)));
        assert_eq!(
            UniformValue::from_slice(&[1.0, 2.0, 3.0]),
            Some(UniformValue::Vec3([1.0, 2.0, 3.0]))
        );
        let identity: Vec<f32> = (0..16)
            .map(|i| if i % 5 == 0 { 1.0 } else { 0.0 })
            .collect();
        assert!(matches!(
            UniformValue::from_slice(&identity),
            Some(UniformValue::Mat4(_))
        ));
        assert_eq!(UniformValue::from_slice(&[]), None);
        assert_eq!(UniformValue::from_slice(&[0.0; 5]), None);
        assert_eq!(UniformValue::from_slice(&[0.0; 9]), None);
    }

    #[test]
    fn lerp_requires_matching_shape() {
        let from = UniformValue::Vec2([0.0, 10.0]);
        let to = UniformValue::Vec2([1.0, 20.0]);
        assert_eq!(from.lerp(&to, 0.5), Some(UniformValue::Vec2([0.5, 15.0])));
        assert_eq!(from.lerp(&UniformValue::Float(1.0), 0.5), None);
        assert_eq!(
            UniformValue::Int(0).lerp(&UniformValue::Int(10), 0.26),
            Some(UniformValue::Int(3))
        );
    }
}
