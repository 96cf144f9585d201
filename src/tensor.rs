//! Shared parameter handles
//!
//! `Tensor` is a cheaply clonable handle to a flat `f32` buffer plus an
//! optional gradient. Cloning aliases the underlying storage, so a model
//! can hand its parameters to an optimizer while keeping its own handles:
//! the optimizer's updates are visible through every alias.

use ndarray::Array1;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

#[derive(Debug)]
struct Inner {
    data: Array1<f32>,
    grad: Option<Array1<f32>>,
    requires_grad: bool,
}

/// A flat parameter tensor with an optional gradient buffer.
#[derive(Debug, Clone)]
pub struct Tensor(Rc<RefCell<Inner>>);

impl Tensor {
    /// Create a tensor from a vector.
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self(Rc::new(RefCell::new(Inner { data: Array1::from_vec(data), grad: None, requires_grad })))
    }

    /// Create a zero-filled tensor.
    pub fn zeros(len: usize, requires_grad: bool) -> Self {
        Self::from_vec(vec![0.0; len], requires_grad)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.borrow().data.len()
    }

    /// Whether the tensor is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this tensor participates in optimization.
    pub fn requires_grad(&self) -> bool {
        self.0.borrow().requires_grad
    }

    /// Borrow the data buffer.
    pub fn data(&self) -> Ref<'_, Array1<f32>> {
        Ref::map(self.0.borrow(), |inner| &inner.data)
    }

    /// Mutably borrow the data buffer.
    pub fn data_mut(&self) -> RefMut<'_, Array1<f32>> {
        RefMut::map(self.0.borrow_mut(), |inner| &mut inner.data)
    }

    /// Copy the data out as a vector.
    pub fn to_vec(&self) -> Vec<f32> {
        self.0.borrow().data.to_vec()
    }

    /// Overwrite the data buffer. Length must match.
    pub fn set_data(&self, data: Array1<f32>) {
        let mut inner = self.0.borrow_mut();
        debug_assert_eq!(inner.data.len(), data.len(), "tensor length is fixed");
        inner.data = data;
    }

    /// Current gradient, if any accumulation has happened.
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.0.borrow().grad.clone()
    }

    /// Add `delta` into the gradient buffer, allocating it on first use.
    pub fn accumulate_grad(&self, delta: &Array1<f32>) {
        let mut inner = self.0.borrow_mut();
        debug_assert_eq!(inner.data.len(), delta.len(), "gradient length mismatch");
        match &mut inner.grad {
            Some(grad) => *grad += delta,
            None => inner.grad = Some(delta.clone()),
        }
    }

    /// Clear the gradient buffer.
    pub fn zero_grad(&self) {
        self.0.borrow_mut().grad = None;
    }

    /// Whether two handles alias the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
