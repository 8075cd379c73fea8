//! Catalog listing: search filter and the aggregation that attaches each
//! book's average rating.

use shelf_db::{Filter, Pipeline, Projection, SortOrder, ID_FIELD};

use crate::modules::reviews;
use crate::utils::PageWindow;

use super::models::UNRATED;

/// Case-insensitive literal substring over title or author; everything when
/// the term is absent or empty.
pub fn search_filter(search: Option<&str>) -> Filter {
    match search.filter(|term| !term.is_empty()) {
        None => Filter::all(),
        Some(term) => Filter::or(vec![
            Filter::contains_ignore_case("title", term),
            Filter::contains_ignore_case("author", term),
        ]),
    }
}

/// Match, window in insertion order, join reviews, average their ratings and
/// keep only client fields.
pub fn listing_pipeline(filter: Filter, window: PageWindow) -> Pipeline {
    Pipeline::new()
        .matching(filter)
        .sort_by(ID_FIELD, SortOrder::Ascending)
        .skip(window.offset)
        .limit(window.limit)
        .lookup(reviews::COLLECTION, ID_FIELD, "book", "reviews")
        .average("reviews", "rating", "averageRating")
        .project(vec![
            Projection::field("title"),
            Projection::field("author"),
            Projection::field("genre"),
            Projection::field("description"),
            Projection::field("publishedYear"),
            Projection::field("image"),
            Projection::or_else("averageRating", UNRATED),
        ])
}
