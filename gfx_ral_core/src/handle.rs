//! Opaque handles returned by the pools.
//!
//! Every handle class wraps a plain `u32` index. A reserved all-ones value
//! (`null`) marks the absence of a handle. Passing a handle of one class
//! where another is expected is a programmer error the API does not detect;
//! generation checks (see [`crate::pool::HandlePool`]) catch use of a handle
//! after its slot has been released and reused within the *same* class.

use core::fmt;

/// Index type backing every handle.
pub type Index = u32;

/// Reserved index marking an invalid/absent handle.
pub const NULL_INDEX: Index = Index::MAX;

/// Generation counter stamped into a handle at acquire time.
pub type Generation = u32;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            index: Index,
        }

        impl $name {
            /// The null sentinel for this handle class.
            pub const NULL: Self = Self { index: NULL_INDEX };

            /// Construct a handle wrapping a raw index. Used by pools only.
            #[inline]
            pub const fn from_index(index: Index) -> Self {
                Self { index }
            }

            /// The raw index this handle wraps.
            #[inline]
            pub const fn index(self) -> Index {
                self.index
            }

            /// `true` unless this is the [`Self::NULL`] sentinel.
            #[inline]
            pub const fn is_valid(self) -> bool {
                self.index != NULL_INDEX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NULL
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, concat!(stringify!($name), "({})"), self.index)
                } else {
                    write!(f, concat!(stringify!($name), "(null)"))
                }
            }
        }
    };
}

define_handle!(
    /// A buffer, texture, or injected swapchain backbuffer.
    ResourceHandle
);
define_handle!(
    /// A graphics, compute, or raytracing pipeline state object.
    ///
    /// Raytracing PSOs live in an index range offset from the non-raytracing
    /// range, so "is this a raytracing PSO?" is decidable from the handle
    /// alone; see [`crate::handle::PIPELINE_RT_INDEX_OFFSET`].
    PipelineStateHandle
);
define_handle!(
    /// A bound shader argument: SRV+UAV range plus sampler range.
    ShaderViewHandle
);
define_handle!(
    /// A recorded command list, ready to submit or discard.
    ///
    /// The queue kind is encoded in the index range (see
    /// [`crate::handle::queue_handle_offset`]); decoding is a range test.
    CommandListHandle
);
define_handle!(
    /// A window surface and its backbuffer ring.
    SwapchainHandle
);
define_handle!(
    /// A CPU/GPU-signalable 64-bit counter.
    FenceHandle
);
define_handle!(
    /// A contiguous block of N queries of one kind.
    ///
    /// Like command lists, the query kind is encoded in the index range.
    QueryRangeHandle
);
define_handle!(
    /// A raytracing acceleration structure (result + scratch [+ instances]).
    AccelStructHandle
);

/// Offset, in handle-index units, between the plain-PSO range and the
/// raytracing-PSO range of [`PipelineStateHandle`].
///
/// Kept generous: real deployments cap `max_num_pipeline_states` and
/// `max_num_raytrace_pipeline_states` well under this.
pub const PIPELINE_RT_INDEX_OFFSET: Index = 1_000_000;

/// Per-queue-kind stride used to partition [`CommandListHandle`] (and,
/// analogously, [`QueryRangeHandle`]) index space by queue/query kind.
pub const QUEUE_INDEX_STEP: Index = 1_000_000;

/// A 64-bit handle variant that additionally carries a generation counter,
/// stamped into the high 32 bits at acquire time and checked on every
/// `get`. Used by pools that want dangling-handle detection (see
/// [`crate::pool::HandlePool::acquire_generational`]).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationalHandle {
    index: Index,
    generation: Generation,
}

impl GenerationalHandle {
    pub const NULL: Self = Self { index: NULL_INDEX, generation: 0 };

    #[inline]
    pub const fn new(index: Index, generation: Generation) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> Index {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> Generation {
        self.generation
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.index != NULL_INDEX
    }
}

impl Default for GenerationalHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for GenerationalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "GenerationalHandle({}, gen {})", self.index, self.generation)
        } else {
            write!(f, "GenerationalHandle(null)")
        }
    }
}
