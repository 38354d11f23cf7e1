// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

//! `pi-rec` runs the PI-REC generator, which reconstructs a picture from a
//! sparse edge map and a flat colour domain.
//!
//! First, you load a [`Config`] from a checkpoint directory and build a
//! [`Session`] from it via a [`SessionBuilder`]. Calling `build` validates the
//! configuration, picks the compute device and, for `MODE = 2`, prepares the
//! test file list.
//!
//! After [`Session::load`] has read the generator weights, a session can
//!
//! 1. Batch evaluate every sample of `TEST_FLIST` with [`Session::test`],
//!    deriving the edge map and colour domain from each picture
//! 2. Synthesize a single image from a user supplied colour domain and edge
//!    map with [`Session::draw`]
//!
//! ## Usage
//!
//! ```no_run
//! let mut config = pi_rec::Config::load("checkpoints").expect("failed to load config");
//! config.mode = pi_rec::Mode::Draw;
//!
//! let mut session = pi_rec::Session::builder(config)
//!     .build()
//!     .expect("failed to build session");
//!
//! session.load().expect("failed to load the generator");
//!
//! let img = session
//!     .draw(&"imgs/color_domain.png", &"imgs/edge.png")
//!     .expect("failed to draw");
//!
//! img.save("out.png").expect("failed to save generated image");
//! ```
mod config;
use config::*;
mod dataset;
use dataset::*;
mod errors;
mod generator;
use generator::*;
pub mod session;
mod utils;
use utils::*;

pub use candle_core;
pub use image;

pub use config::{parse_device, Config, Mode, CONFIG_FILE, DEFAULT_EDGE_THRESHOLD};
pub use dataset::{load_flist, Dataset, Sample};
pub use errors::{Error, InvalidRange};
pub use generator::{Generator, ModelMode, PiRecGenerator, CHECKPOINT_NAME};
pub use session::{ProgressUpdate, Session, SessionBuilder, TestProgress, TestReport};
pub use utils::{
    binarize_edge, imsave, load_dynamic_image, output_align, postprocess, split_extension,
    to_image, to_tensor, ImageSource,
};

/// Simple dimensions struct
#[derive(Copy, Clone)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
}
