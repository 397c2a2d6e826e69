//! Step List - ordered sequence steps with dense `1..N` numbering

use cloudgreet_storage::models::StepInput;

/// Ordered steps of a sequence being edited
///
/// Every mutation renumbers, so `step_order` always equals array position + 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepList {
    steps: Vec<StepInput>,
}

impl StepList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from client-supplied steps, ordering by their `step_order`
    ///
    /// The sort is stable, so duplicate orders keep their array position.
    pub fn from_unordered(mut steps: Vec<StepInput>) -> Self {
        steps.sort_by_key(|s| s.step_order);
        let mut list = Self { steps };
        list.renumber();
        list
    }

    /// Append a step at the end
    pub fn push(&mut self, step: StepInput) {
        self.steps.push(step);
        self.renumber();
    }

    /// Remove the step at `index`
    ///
    /// Returns `false` and leaves the list untouched when `index` is out of
    /// range or the step is the only one left.
    pub fn remove(&mut self, index: usize) -> bool {
        if self.steps.len() <= 1 || index >= self.steps.len() {
            return false;
        }
        self.steps.remove(index);
        self.renumber();
        true
    }

    /// Move the step at `from` to position `to`
    pub fn move_step(&mut self, from: usize, to: usize) -> bool {
        if from >= self.steps.len() || to >= self.steps.len() {
            return false;
        }
        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        self.renumber();
        true
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn as_slice(&self) -> &[StepInput] {
        &self.steps
    }

    pub fn into_vec(self) -> Vec<StepInput> {
        self.steps
    }

    fn renumber(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.step_order = i as i32 + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudgreet_common::types::Channel;
    use pretty_assertions::assert_eq;

    fn step(order: i32, channel: Channel, wait: i32) -> StepInput {
        StepInput {
            step_order: order,
            channel,
            wait_minutes: wait,
            template_id: None,
        }
    }

    fn orders(list: &StepList) -> Vec<i32> {
        list.as_slice().iter().map(|s| s.step_order).collect()
    }

    #[test]
    fn test_push_numbers_densely() {
        let mut list = StepList::new();
        list.push(step(7, Channel::Email, 0));
        list.push(step(7, Channel::Sms, 60));
        assert_eq!(orders(&list), vec![1, 2]);
    }

    #[test]
    fn test_remove_renumbers() {
        let mut list = StepList::from_unordered(vec![
            step(1, Channel::Email, 0),
            step(2, Channel::Sms, 60),
            step(3, Channel::Call, 120),
            step(4, Channel::Email, 180),
        ]);

        assert!(list.remove(1));
        assert_eq!(orders(&list), vec![1, 2, 3]);
        let waits: Vec<i32> = list.as_slice().iter().map(|s| s.wait_minutes).collect();
        assert_eq!(waits, vec![0, 120, 180]);
    }

    #[test]
    fn test_remove_last_remaining_is_noop() {
        let mut list = StepList::from_unordered(vec![step(1, Channel::Call, 0)]);
        assert!(!list.remove(0));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let mut list =
            StepList::from_unordered(vec![step(1, Channel::Call, 0), step(2, Channel::Sms, 5)]);
        assert!(!list.remove(5));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_from_unordered_sorts_by_client_order() {
        let list = StepList::from_unordered(vec![
            step(30, Channel::Call, 2),
            step(10, Channel::Email, 0),
            step(20, Channel::Sms, 1),
        ]);
        let channels: Vec<Channel> = list.as_slice().iter().map(|s| s.channel).collect();
        assert_eq!(channels, vec![Channel::Email, Channel::Sms, Channel::Call]);
        assert_eq!(orders(&list), vec![1, 2, 3]);
    }

    #[test]
    fn test_move_step() {
        let mut list = StepList::from_unordered(vec![
            step(1, Channel::Email, 0),
            step(2, Channel::Sms, 1),
            step(3, Channel::Call, 2),
        ]);
        assert!(list.move_step(2, 0));
        let channels: Vec<Channel> = list.as_slice().iter().map(|s| s.channel).collect();
        assert_eq!(channels, vec![Channel::Call, Channel::Email, Channel::Sms]);
        assert_eq!(orders(&list), vec![1, 2, 3]);
        assert!(!list.move_step(0, 3));
    }
}
