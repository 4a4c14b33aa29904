//! Page-range selection: validate a requested range against the page count.

use crate::config::PageSelection;
use crate::error::ConvertError;

/// Expand `selection` into the ascending list of 1-based ordinals to process.
///
/// Unlike a lenient clip-to-document approach, a range that does not fit the
/// document is an error: nothing is processed when the bounds are inverted,
/// non-positive, or past the last page.
pub fn select_pages(
    selection: &PageSelection,
    page_count: usize,
) -> Result<Vec<usize>, ConvertError> {
    match *selection {
        PageSelection::All => Ok((1..=page_count).collect()),
        PageSelection::Range(start, end) => {
            let invalid = |reason| ConvertError::InvalidRange {
                start: start as i64,
                end: end as i64,
                page_count: Some(page_count),
                reason,
            };
            if start == 0 || end == 0 {
                return Err(invalid("page numbers start at 1"));
            }
            if start > end {
                return Err(invalid("start is after end"));
            }
            if end > page_count {
                return Err(invalid("end is past the last page"));
            }
            Ok((start..=end).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_pages() {
        assert_eq!(
            select_pages(&PageSelection::All, 4).unwrap(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn valid_ranges_are_exact_and_ascending() {
        for count in 1..=6usize {
            for s in 1..=count {
                for e in s..=count {
                    let got = select_pages(&PageSelection::Range(s, e), count).unwrap();
                    let want: Vec<usize> = (s..=e).collect();
                    assert_eq!(got, want, "range {s}-{e} of {count}");
                }
            }
        }
    }

    #[test]
    fn single_page_range() {
        assert_eq!(select_pages(&PageSelection::Range(3, 3), 5).unwrap(), vec![3]);
    }

    #[test]
    fn inverted_range_fails() {
        let err = select_pages(&PageSelection::Range(4, 2), 10).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::InvalidRange {
                reason: "start is after end",
                ..
            }
        ));
    }

    #[test]
    fn zero_bound_fails() {
        assert!(select_pages(&PageSelection::Range(0, 2), 10).is_err());
        assert!(select_pages(&PageSelection::Range(1, 0), 10).is_err());
    }

    #[test]
    fn end_past_document_fails() {
        let err = select_pages(&PageSelection::Range(2, 11), 10).unwrap_err();
        match err {
            ConvertError::InvalidRange {
                end, page_count, ..
            } => {
                assert_eq!(end, 11);
                assert_eq!(page_count, Some(10));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
