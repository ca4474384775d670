//! Standard transducers.
//!
//! Every transducer here is a reusable template: applying it to a reducer
//! builds a stage with its own per-reduction state.

mod basic;
mod cat;
mod hooks;
pub mod join;

pub use basic::{
    drop_first, drop_while, filter, map, match_first, scan, take, take_while, Candidate, DropFirst,
    DropStage, DropWhile, DropWhileStage, Filter, FilterStage, Map, MapStage, MatchFirst,
    MatchStage, Scan, ScanStage, Take, TakeStage, TakeWhile, TakeWhileStage,
};
pub use cat::{cat, cat_with, mapcat, mapcat_with, Cat, CatStage, MapCat};
pub use hooks::{done, err, Catch, CatchStage, Done, DoneStage};
pub use join::{latest, sequential, wait, Branch, Join, Latest, Sequential, Wait};
