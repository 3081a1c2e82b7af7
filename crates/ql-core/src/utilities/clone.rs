//! Value semantics for boxed trait objects (translates the `Clone<T>` proxy
//! of `ql/utilities/clone.hpp`).
//!
//! QuantLib stores polymorphic objects by value through a proxy that
//! deep-copies via a virtual `clone()`.  In Rust the owning handle is simply
//! `Box<dyn Trait>`: moving the box transfers ownership without copying, and
//! [`clone_trait_object!`] gives it a `Clone` impl that deep-copies through the
//! trait's own `clone_box` method.

/// Implement `Clone` for `Box<dyn Trait>` in terms of `Trait::clone_box`.
///
/// The trait must declare `fn clone_box(&self) -> Box<dyn Trait>`.
///
/// ```
/// use ql_core::clone_trait_object;
///
/// trait Payoff: Send {
///     fn value(&self, x: f64) -> f64;
///     fn clone_box(&self) -> Box<dyn Payoff>;
/// }
/// clone_trait_object!(Payoff);
///
/// #[derive(Clone)]
/// struct Call(f64);
/// impl Payoff for Call {
///     fn value(&self, x: f64) -> f64 { (x - self.0).max(0.0) }
///     fn clone_box(&self) -> Box<dyn Payoff> { Box::new(self.clone()) }
/// }
///
/// let original: Box<dyn Payoff> = Box::new(Call(1.0));
/// let copy = original.clone();
/// assert_eq!(copy.value(3.0), 2.0);
/// ```
#[macro_export]
macro_rules! clone_trait_object {
    ($($trait:tt)+) => {
        impl ::core::clone::Clone for ::std::boxed::Box<dyn $($trait)+> {
            fn clone(&self) -> Self {
                self.clone_box()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    trait Counter: Send {
        fn bump(&mut self) -> usize;
        fn clone_box(&self) -> Box<dyn Counter>;
    }
    clone_trait_object!(Counter);

    #[derive(Clone)]
    struct Simple(usize);

    impl Counter for Simple {
        fn bump(&mut self) -> usize {
            self.0 += 1;
            self.0
        }
        fn clone_box(&self) -> Box<dyn Counter> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn clone_is_deep() {
        let mut a: Box<dyn Counter> = Box::new(Simple(0));
        a.bump();
        let mut b = a.clone();
        assert_eq!(b.bump(), 2);
        assert_eq!(b.bump(), 3);
        // the original is unaffected by the copy's progress
        assert_eq!(a.bump(), 2);
    }

    #[test]
    fn move_transfers_without_copy() {
        let mut a: Box<dyn Counter> = Box::new(Simple(5));
        a.bump();
        let mut moved = a;
        assert_eq!(moved.bump(), 7);
    }
}
