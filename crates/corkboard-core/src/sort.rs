use std::cmp::Ordering;

use chrono::NaiveDate;

use crate::datetime::days_until;
use crate::model::{Id, Priority, Project, Task};

/// Due distance given to entities without a due date. Anything at or
/// beyond it is "not due soon" and sorts by priority.
pub const DUE_DATE_IGNORE_DAYS: i64 = 10;

pub trait Sortable {
    fn priority(&self) -> Priority;
    fn due_date(&self) -> Option<NaiveDate>;
}

impl Sortable for Task {
    fn priority(&self) -> Priority {
        self.priority
    }

    fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }
}

impl Sortable for Project {
    fn priority(&self) -> Priority {
        self.priority
    }

    fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }
}

impl<T: Sortable + ?Sized> Sortable for &T {
    fn priority(&self) -> Priority {
        (**self).priority()
    }

    fn due_date(&self) -> Option<NaiveDate> {
        (**self).due_date()
    }
}

#[must_use]
pub fn due_in_or_ignore<T>(item: &T, today: NaiveDate) -> i64
where
    T: Sortable + ?Sized,
{
    item.due_date()
        .map(|due| days_until(due, today))
        .unwrap_or(DUE_DATE_IGNORE_DAYS)
}

/// Orders by due proximity when either side is due within the window,
/// otherwise by descending priority. Equal keys compare `Equal`, so
/// callers rely on a stable sort for the remaining order.
pub fn by_due_and_priority<T>(a: &T, b: &T, today: NaiveDate) -> Ordering
where
    T: Sortable + ?Sized,
{
    let a_due = due_in_or_ignore(a, today);
    let b_due = due_in_or_ignore(b, today);

    if a_due < DUE_DATE_IGNORE_DAYS {
        if b_due > a_due {
            return Ordering::Less;
        } else if b_due < a_due && b_due < DUE_DATE_IGNORE_DAYS {
            return Ordering::Greater;
        }
    } else if b_due < DUE_DATE_IGNORE_DAYS {
        return Ordering::Greater;
    }

    b.priority().sort_value().cmp(&a.priority().sort_value())
}

pub fn sort_by_due_and_priority<T>(items: &mut [T], today: NaiveDate)
where
    T: Sortable,
{
    items.sort_by(|a, b| by_due_and_priority(a, b, today));
}

/// Sorts identifiers by the entities they name. Identifiers the lookup
/// cannot resolve keep their relative order after every resolved one.
#[tracing::instrument(skip(ids, lookup))]
pub fn sort_ids_by_due_and_priority<'a, T, F>(ids: &[Id], lookup: F, today: NaiveDate) -> Vec<Id>
where
    T: Sortable + 'a,
    F: Fn(Id) -> Option<&'a T>,
{
    let mut resolved: Vec<(Id, &'a T)> = Vec::with_capacity(ids.len());
    let mut missing = Vec::new();

    for &id in ids {
        match lookup(id) {
            Some(item) => resolved.push((id, item)),
            None => missing.push(id),
        }
    }

    if !missing.is_empty() {
        tracing::debug!(?missing, "unresolved ids kept at the end");
    }

    resolved.sort_by(|(_, a), (_, b)| by_due_and_priority(*a, *b, today));

    resolved
        .into_iter()
        .map(|(id, _)| id)
        .chain(missing)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Days;

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 17).unwrap()
    }

    fn task(id: Id, due_in: Option<u64>, priority: Priority) -> Task {
        let mut t = Task::new(id, format!("t{id}"), 1);
        t.priority = priority;
        t.due_date = due_in.map(|days| today().checked_add_days(Days::new(days)).unwrap());
        t
    }

    #[test]
    fn soon_due_beats_higher_priority() {
        let a = task(1, Some(2), Priority::Medium);
        let b = task(2, Some(15), Priority::High);
        assert_eq!(by_due_and_priority(&a, &b, today()), Ordering::Less);
        assert_eq!(by_due_and_priority(&b, &a, today()), Ordering::Greater);
    }

    #[test]
    fn undated_items_sort_by_priority() {
        let a = task(1, None, Priority::Low);
        let b = task(2, None, Priority::High);
        assert_eq!(by_due_and_priority(&a, &b, today()), Ordering::Greater);
    }

    #[test]
    fn distance_ten_is_not_soon() {
        let a = task(1, Some(10), Priority::Low);
        let b = task(2, None, Priority::High);
        assert_eq!(by_due_and_priority(&a, &b, today()), Ordering::Greater);
        assert_eq!(by_due_and_priority(&b, &a, today()), Ordering::Less);
    }

    #[test]
    fn equal_soon_distance_falls_through_to_priority() {
        let a = task(1, Some(3), Priority::Low);
        let b = task(2, Some(3), Priority::High);
        assert_eq!(by_due_and_priority(&a, &b, today()), Ordering::Greater);

        let c = task(3, Some(3), Priority::Low);
        assert_eq!(by_due_and_priority(&a, &c, today()), Ordering::Equal);
    }

    #[test]
    fn overdue_sorts_before_due_today() {
        let mut overdue = task(1, None, Priority::Low);
        overdue.due_date = today().checked_sub_days(Days::new(2));
        let due_today = task(2, Some(0), Priority::High);
        assert_eq!(
            by_due_and_priority(&overdue, &due_today, today()),
            Ordering::Less
        );
    }

    #[test]
    fn comparator_agrees_with_clamped_key() {
        // The branches reduce to (min(due, 10), -priority), so the
        // order is consistent for sort_by.
        let dues = [None, Some(0), Some(1), Some(9), Some(10), Some(11), Some(30)];
        let priorities = [Priority::Low, Priority::Medium, Priority::High];
        let mut items = Vec::new();
        for due in dues {
            for priority in priorities {
                items.push(task(0, due, priority));
            }
        }

        let key = |t: &Task| {
            (
                due_in_or_ignore(t, today()).min(DUE_DATE_IGNORE_DAYS),
                -t.priority.sort_value(),
            )
        };
        for a in &items {
            for b in &items {
                assert_eq!(
                    by_due_and_priority(a, b, today()),
                    key(a).cmp(&key(b)),
                    "a={:?} b={:?}",
                    (a.due_date, a.priority),
                    (b.due_date, b.priority)
                );
            }
        }
    }

    #[test]
    fn sort_is_stable_for_ties() {
        let mut items = vec![
            task(1, None, Priority::Medium),
            task(2, None, Priority::Medium),
            task(3, Some(1), Priority::Low),
            task(4, None, Priority::High),
            task(5, None, Priority::Medium),
        ];
        sort_by_due_and_priority(&mut items, today());
        let ids: Vec<Id> = items.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 4, 1, 2, 5]);
    }

    #[test]
    fn sorting_ids_keeps_unknown_ids_last() {
        let tasks: BTreeMap<Id, Task> = [task(1, None, Priority::Low), task(2, None, Priority::High)]
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let sorted = sort_ids_by_due_and_priority(&[99, 1, 2], |id| tasks.get(&id), today());
        assert_eq!(sorted, vec![2, 1, 99]);
    }
}
