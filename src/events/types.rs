//! Core types of the event system: subscription identity and the
//! type-erasure protocol.
//!
//! Publishers and subscribers are parameterized over arbitrary argument
//! tuples, but the worker pool only ever sees zero-argument work items.
//! The bridge is the [`Invoker`] trait: each handler is wrapped into an
//! erased object that advertises the exact argument tuple it accepts and
//! knows how to apply a shared [`ArgPack`] to the user callable.
//!
//! [`IntoInvoker`] is implemented for plain `Fn` callables of up to eight
//! reference arguments, so `|n: &u64, label: &String| ...` subscribes
//! directly; the argument tuple type is recovered from the callable's
//! signature the same way the registry recovers it from the published
//! pack. A zero-argument handler is a wildcard: it runs for any published
//! payload.
//!
//! Signature checks happen at dispatch time, not publish time: a handler
//! whose tuple does not match the published pack is never called, and the
//! mismatch is reported to the dispatch layer as a [`SignatureMismatch`].

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

/// Process-unique identifier of one subscription.
///
/// Allocated from a single monotonically increasing counter shared across
/// topics; `0` is reserved as "never issued" and IDs are not reused
/// during a bus lifetime.
pub type SubscriptionId = u64;

/// Marker for argument tuples that can be published on the bus.
///
/// Implemented for `()` and for tuples of up to eight `Send + Sync +
/// 'static` elements. Publishing always takes the packed tuple form:
/// `bus.publish("topic", (42u64, "label".to_string()))`.
pub trait EventArgs: Send + Sync + 'static {
    /// Number of argument positions in the tuple.
    const ARITY: usize;
}

impl EventArgs for () {
    const ARITY: usize = 0;
}

/// An argument tuple packed once per publish and shared by every fan-out
/// task.
///
/// The payload is immutable; handlers receive borrowed views into it.
pub struct ArgPack {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
    arity: usize,
}

impl ArgPack {
    /// Pack an argument tuple for shared ownership across fan-out tasks.
    pub fn pack<A: EventArgs>(args: A) -> Arc<Self> {
        Arc::new(ArgPack {
            value: Box::new(args),
            type_name: std::any::type_name::<A>(),
            arity: A::ARITY,
        })
    }

    /// Borrow the packed tuple as a concrete type, if it matches.
    pub fn downcast_ref<A: EventArgs>(&self) -> Option<&A> {
        self.value.downcast_ref::<A>()
    }

    /// Name of the packed tuple type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of argument positions in the packed tuple.
    pub fn arity(&self) -> usize {
        self.arity
    }
}

/// An invoker refused a payload whose tuple type does not match its
/// declared signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler expects {expected}, received {received}")]
pub struct SignatureMismatch {
    /// Tuple type the handler declared
    pub expected: &'static str,
    /// Tuple type that was published
    pub received: &'static str,
}

/// A type-erased handler.
///
/// One invoker is created per subscription and is immutable afterwards.
/// It carries the full argument signature (arity plus tuple type
/// identity) of the handler it wraps.
pub trait Invoker: Send + Sync {
    /// Apply a shared argument pack to the wrapped handler.
    ///
    /// Returns [`SignatureMismatch`] without calling the handler when the
    /// pack's tuple type differs from the declared signature. Zero-argument
    /// handlers accept any pack.
    fn invoke(&self, args: &ArgPack) -> Result<(), SignatureMismatch>;

    /// Number of argument positions the handler declares.
    fn arity(&self) -> usize;

    /// `TypeId` of the argument tuple the handler accepts.
    fn args_type(&self) -> TypeId;

    /// Human-readable name of that tuple type.
    fn args_type_name(&self) -> &'static str;
}

/// Conversion of user callables into erased invokers.
///
/// `A` is the argument tuple recovered from the callable's signature.
pub trait IntoInvoker<A: EventArgs> {
    /// Wrap the callable into an erased, shareable invoker.
    fn into_invoker(self) -> Arc<dyn Invoker>;
}

/// Invoker implementation for a plain `Fn` over one concrete tuple.
struct FnInvoker<A, F> {
    handler: F,
    _args: PhantomData<fn(&A)>,
}

impl<F> IntoInvoker<()> for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn into_invoker(self) -> Arc<dyn Invoker> {
        Arc::new(FnInvoker::<(), F> {
            handler: self,
            _args: PhantomData,
        })
    }
}

impl<F> Invoker for FnInvoker<(), F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn invoke(&self, _args: &ArgPack) -> Result<(), SignatureMismatch> {
        (self.handler)();
        Ok(())
    }

    fn arity(&self) -> usize {
        0
    }

    fn args_type(&self) -> TypeId {
        TypeId::of::<()>()
    }

    fn args_type_name(&self) -> &'static str {
        std::any::type_name::<()>()
    }
}

macro_rules! impl_tuple_invoker {
    ($arity:literal => $($ty:ident . $idx:tt),+) => {
        impl<$($ty,)+> EventArgs for ($($ty,)+)
        where
            $($ty: Send + Sync + 'static,)+
        {
            const ARITY: usize = $arity;
        }

        impl<F, $($ty,)+> IntoInvoker<($($ty,)+)> for F
        where
            F: Fn($(&$ty,)+) + Send + Sync + 'static,
            $($ty: Send + Sync + 'static,)+
        {
            fn into_invoker(self) -> Arc<dyn Invoker> {
                Arc::new(FnInvoker::<($($ty,)+), F> {
                    handler: self,
                    _args: PhantomData,
                })
            }
        }

        impl<F, $($ty,)+> Invoker for FnInvoker<($($ty,)+), F>
        where
            F: Fn($(&$ty,)+) + Send + Sync + 'static,
            $($ty: Send + Sync + 'static,)+
        {
            fn invoke(&self, args: &ArgPack) -> Result<(), SignatureMismatch> {
                match args.downcast_ref::<($($ty,)+)>() {
                    Some(tuple) => {
                        (self.handler)($(&tuple.$idx,)+);
                        Ok(())
                    }
                    None => Err(SignatureMismatch {
                        expected: std::any::type_name::<($($ty,)+)>(),
                        received: args.type_name(),
                    }),
                }
            }

            fn arity(&self) -> usize {
                $arity
            }

            fn args_type(&self) -> TypeId {
                TypeId::of::<($($ty,)+)>()
            }

            fn args_type_name(&self) -> &'static str {
                std::any::type_name::<($($ty,)+)>()
            }
        }
    };
}

impl_tuple_invoker!(1 => A0.0);
impl_tuple_invoker!(2 => A0.0, A1.1);
impl_tuple_invoker!(3 => A0.0, A1.1, A2.2);
impl_tuple_invoker!(4 => A0.0, A1.1, A2.2, A3.3);
impl_tuple_invoker!(5 => A0.0, A1.1, A2.2, A3.3, A4.4);
impl_tuple_invoker!(6 => A0.0, A1.1, A2.2, A3.3, A4.4, A5.5);
impl_tuple_invoker!(7 => A0.0, A1.1, A2.2, A3.3, A4.4, A5.5, A6.6);
impl_tuple_invoker!(8 => A0.0, A1.1, A2.2, A3.3, A4.4, A5.5, A6.6, A7.7);
