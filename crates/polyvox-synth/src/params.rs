//! Lock-free parameter hand-off between the control and audio threads.

use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, bounded};

/// Values the audio thread retired, waiting to be dropped elsewhere.
const RECLAIM_CAPACITY: usize = 64;

/// Moves values off the audio thread so their memory is freed by whoever
/// calls [`Reclaimer::collect`].
///
/// The audio thread hands over values it no longer needs with
/// [`Reclaimer::retire`]. If nobody collects and the queue fills up, the
/// value is dropped in place instead, so the queue never grows.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use polyvox_synth::Reclaimer;
///
/// let reclaimer = Reclaimer::new();
/// let control = reclaimer.clone();
///
/// // audio thread
/// assert!(reclaimer.retire(Arc::new(vec![0.0_f32; 1024])));
///
/// // control thread
/// assert_eq!(control.collect(), 1);
/// ```
pub struct Reclaimer<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Reclaimer<T> {
    /// Empty queue.
    pub fn new() -> Self {
        let (tx, rx) = bounded(RECLAIM_CAPACITY);
        Self { tx, rx }
    }

    /// Hands `value` over for dropping. Never blocks. Returns `false` when
    /// the queue was full and `value` was dropped on the calling thread.
    pub fn retire(&self, value: T) -> bool {
        let queued = self.tx.try_send(value).is_ok();
        if !queued {
            #[cfg(feature = "tracing")]
            tracing::debug!(capacity = RECLAIM_CAPACITY, "reclaim queue full, dropping in place");
        }
        queued
    }

    /// Drops everything retired so far. Returns how many values were dropped.
    pub fn collect(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Values waiting to be dropped.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl<T> Clone for Reclaimer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for Reclaimer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> core::fmt::Debug for Reclaimer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reclaimer").field("pending", &self.pending()).finish()
    }
}

/// Shared, atomically replaceable voice parameters.
///
/// The control thread publishes whole snapshots with [`ParamsHandle::store`];
/// the audio thread picks up the latest one at the start of each block with
/// [`ParamsHandle::load`]. Voices then read a stable `Arc<P>` for the whole
/// block, so a parameter change never lands halfway through a buffer.
///
/// Snapshots the audio thread is done with go back through
/// [`ParamsHandle::retire`] and are dropped by the next publish (or an
/// explicit [`ParamsHandle::collect_retired`]) on the control side.
///
/// # Example
///
/// ```rust
/// use polyvox_synth::{OscillatorVoiceParams, ParamsHandle};
///
/// let handle = ParamsHandle::new(OscillatorVoiceParams::default());
/// let control = handle.clone();
///
/// control.update(|p| OscillatorVoiceParams { vol: 0.5, ..p.clone() });
/// assert_eq!(handle.load().vol, 0.5);
/// ```
pub struct ParamsHandle<P> {
    inner: Arc<ArcSwap<P>>,
    retired: Reclaimer<Arc<P>>,
}

impl<P> ParamsHandle<P> {
    /// Wraps the initial parameters.
    pub fn new(params: P) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(params)),
            retired: Reclaimer::new(),
        }
    }

    /// Latest snapshot.
    #[inline]
    pub fn load(&self) -> Arc<P> {
        self.inner.load_full()
    }

    /// Publishes a new snapshot.
    pub fn store(&self, params: P) {
        self.store_arc(Arc::new(params));
    }

    /// Publishes an already shared snapshot.
    pub fn store_arc(&self, params: Arc<P>) {
        self.collect_retired();
        self.inner.store(params);
    }

    /// Replaces the snapshot with `f(current)`, retrying if another writer
    /// raced in between.
    pub fn update<F>(&self, mut f: F)
    where
        F: FnMut(&P) -> P,
    {
        self.collect_retired();
        self.inner.rcu(|current| Arc::new(f(current)));
    }

    /// Audio side: gives back a snapshot that was replaced.
    pub fn retire(&self, old: Arc<P>) -> bool {
        self.retired.retire(old)
    }

    /// Control side: drops retired snapshots. Returns how many.
    pub fn collect_retired(&self) -> usize {
        self.retired.collect()
    }

    /// Retired snapshots not yet dropped.
    pub fn retired_pending(&self) -> usize {
        self.retired.pending()
    }
}

impl<P> Clone for ParamsHandle<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            retired: self.retired.clone(),
        }
    }
}

impl<P: Default> Default for ParamsHandle<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

impl<P: core::fmt::Debug> core::fmt::Debug for ParamsHandle<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ParamsHandle").field(&*self.inner.load()).finish()
    }
}
