use tracing::info;

use crate::database::Database;
use crate::error::Result;

const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Sorting", "Algorithms for arranging elements in a specific order"),
    ("Searching", "Algorithms for finding elements in data structures"),
    ("Graph", "Algorithms for operating on graph data structures"),
    (
        "Dynamic Programming",
        "Algorithms that solve complex problems by breaking them into simpler subproblems",
    ),
];

// Each sample only defines its entry function; the runner binds and calls it.
const BUBBLE_SORT_V1: &str = r#"def bubble_sort(arr):
    n = len(arr)
    for i in range(n):
        for j in range(0, n - i - 1):
            if arr[j] > arr[j + 1]:
                arr[j], arr[j + 1] = arr[j + 1], arr[j]
    return arr
"#;

const BUBBLE_SORT_V2: &str = r#"def optimized_bubble_sort(arr):
    n = len(arr)
    swapped = True
    while swapped:
        swapped = False
        for i in range(n - 1):
            if arr[i] > arr[i + 1]:
                arr[i], arr[i + 1] = arr[i + 1], arr[i]
                swapped = True
    return arr
"#;

const QUICK_SORT: &str = r#"def quick_sort(arr):
    if len(arr) <= 1:
        return arr
    pivot = arr[len(arr) // 2]
    left = [x for x in arr if x < pivot]
    middle = [x for x in arr if x == pivot]
    right = [x for x in arr if x > pivot]
    return quick_sort(left) + middle + quick_sort(right)
"#;

const MERGE_SORT: &str = r#"def merge_sort(arr):
    if len(arr) <= 1:
        return arr
    mid = len(arr) // 2
    return merge(merge_sort(arr[:mid]), merge_sort(arr[mid:]))

def merge(left, right):
    result = []
    i = j = 0
    while i < len(left) and j < len(right):
        if left[i] <= right[j]:
            result.append(left[i])
            i += 1
        else:
            result.append(right[j])
            j += 1
    result.extend(left[i:])
    result.extend(right[j:])
    return result
"#;

const BINARY_SEARCH: &str = r#"def binary_search(arr):
    if not arr:
        return -1
    target = arr[len(arr) // 2]
    left, right = 0, len(arr) - 1
    while left <= right:
        mid = (left + right) // 2
        if arr[mid] == target:
            return mid
        elif arr[mid] < target:
            left = mid + 1
        else:
            right = mid - 1
    return -1
"#;

/// Populate an empty store with the default categories and sample algorithms.
///
/// Returns `false` without writing anything if the store already has data.
pub fn seed_defaults(db: &mut Database) -> Result<bool> {
    if db.count_algorithms()? > 0 || db.count_categories()? > 0 {
        info!("Database already contains data. Skipping initial data population.");
        return Ok(false);
    }

    let mut category_ids = Vec::with_capacity(DEFAULT_CATEGORIES.len());
    for &(name, description) in DEFAULT_CATEGORIES {
        category_ids.push(db.create_category(name, Some(description))?);
    }
    let sorting = category_ids[0];
    let searching = category_ids[1];

    let bubble = db.register_algorithm("Bubble Sort", "A simple sorting algorithm", BUBBLE_SORT_V1, sorting)?;
    let bubble_v1 = db.latest_version(bubble)?.id;
    let bubble_v2 = db.add_version(bubble, BUBBLE_SORT_V2)?;

    db.register_algorithm(
        "Quick Sort",
        "A divide-and-conquer sorting algorithm with O(n log n) average time complexity",
        QUICK_SORT,
        sorting,
    )?;
    db.register_algorithm(
        "Merge Sort",
        "A stable, divide-and-conquer sorting algorithm with guaranteed O(n log n) time complexity",
        MERGE_SORT,
        sorting,
    )?;
    db.register_algorithm(
        "Binary Search",
        "An efficient search algorithm for finding elements in a sorted array",
        BINARY_SEARCH,
        searching,
    )?;

    db.add_improvement(
        bubble,
        bubble_v1,
        bubble_v2,
        "Added a swapped flag to optimize iterations.",
    )?;
    db.add_feedback(
        bubble,
        bubble_v2,
        "The optimized version avoids unnecessary iterations, improving efficiency.",
        Some(5),
    )?;

    info!("Initial data populated successfully");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StoreConfig;
    use tempfile::NamedTempFile;

    #[test]
    fn test_seed_populates_once() {
        let temp = NamedTempFile::new().unwrap();
        let mut db = Database::create(&StoreConfig::new(temp.path())).unwrap();

        assert!(seed_defaults(&mut db).unwrap());
        assert_eq!(db.count_categories().unwrap(), 4);
        assert_eq!(db.count_algorithms().unwrap(), 4);
        assert_eq!(db.count_versions().unwrap(), 5);

        let algorithms = db.list_algorithms().unwrap();
        assert_eq!(algorithms[0].name, "Bubble Sort");
        assert_eq!(db.latest_version(algorithms[0].id).unwrap().version_number, 2);

        // Samples only define functions; nothing runs at load time
        for algorithm in &algorithms {
            for version in db.versions(algorithm.id).unwrap() {
                assert!(version.code.starts_with("def "), "{}", algorithm.name);
                let top_level_calls = version
                    .code
                    .lines()
                    .filter(|line| !line.is_empty() && !line.starts_with(' '))
                    .filter(|line| !line.starts_with("def "))
                    .count();
                assert_eq!(top_level_calls, 0, "{}", algorithm.name);
            }
        }

        let search = db.category_for_algorithm(algorithms[3].id).unwrap().unwrap();
        assert_eq!(search.name, "Searching");

        assert!(!seed_defaults(&mut db).unwrap());
        assert_eq!(db.count_algorithms().unwrap(), 4);
    }
}
