/// A pagination request. Bounds (`page >= 1`, `limit` 1–100) are
/// enforced by the validated route input that produces it.
#[derive(Debug)]
pub struct Paginate {
	/// The page number to return (1-indexed).
	pub page: i64,
	/// The number of items to return per page.
	pub limit: i64,
}

/// The pagination window resolved against a known row count.
#[derive(Debug, PartialEq, Eq)]
pub struct Window {
	pub page: i64,
	pub total_pages: i64,
	pub offset: i64,
}

impl Paginate {
	/// Resolves the requested page against the total row count.
	///
	/// `total_pages` is `ceil(total / limit)`; an empty result set still
	/// reports a single (empty) page. The requested page is clamped so
	/// an out-of-range request returns the nearest valid page instead of
	/// erroring.
	pub fn resolve(&self, total: i64) -> Window {
		let total_pages = std::cmp::max((total + self.limit - 1) / self.limit, 1);
		let page = self.page.clamp(1, total_pages);

		Window {
			page,
			total_pages,
			offset: (page - 1) * self.limit,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_total_pages_rounds_up() {
		let paginate = Paginate { page: 1, limit: 10 };

		assert_eq!(paginate.resolve(25).total_pages, 3);
		assert_eq!(paginate.resolve(30).total_pages, 3);
		assert_eq!(paginate.resolve(31).total_pages, 4);
	}

	#[test]
	fn test_page_clamped_into_range() {
		let paginate = Paginate { page: 9, limit: 10 };
		let window = paginate.resolve(25);

		assert_eq!(window.page, 3);
		assert_eq!(window.offset, 20);

		let paginate = Paginate { page: 1, limit: 10 };

		assert_eq!(paginate.resolve(25).offset, 0);
	}

	#[test]
	fn test_empty_total_reports_one_page() {
		let paginate = Paginate { page: 3, limit: 10 };

		assert_eq!(
			paginate.resolve(0),
			Window {
				page: 1,
				total_pages: 1,
				offset: 0,
			}
		);
	}

	#[test]
	fn test_exact_multiple() {
		let paginate = Paginate { page: 2, limit: 5 };
		let window = paginate.resolve(10);

		assert_eq!(window.total_pages, 2);
		assert_eq!(window.page, 2);
		assert_eq!(window.offset, 5);
	}
}
