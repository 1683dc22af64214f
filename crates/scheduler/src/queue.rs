//! 우선순위 대기열
//!
//! high / normal / low 세 버킷으로 구성되며, 버킷 안에서는 엄격한 FIFO 순서를 지킵니다.
//! 꺼낼 때는 비어 있지 않은 가장 높은 우선순위 버킷의 앞에서 꺼냅니다.

use std::collections::VecDeque;

use crate::task::{Task, TaskPriority};

/// 3단계 우선순위 대기열
#[derive(Debug, Default)]
pub struct PriorityQueue {
    high: VecDeque<Task>,
    normal: VecDeque<Task>,
    low: VecDeque<Task>,
}

impl PriorityQueue {
    /// 빈 대기열을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_mut(&mut self, priority: TaskPriority) -> &mut VecDeque<Task> {
        match priority {
            TaskPriority::High => &mut self.high,
            TaskPriority::Normal => &mut self.normal,
            TaskPriority::Low => &mut self.low,
        }
    }

    /// 작업을 해당 버킷의 뒤에 추가합니다.
    pub fn push(&mut self, task: Task) {
        self.bucket_mut(task.priority).push_back(task);
    }

    /// 전달에 실패한 작업을 해당 버킷의 앞으로 되돌립니다.
    pub fn push_front(&mut self, task: Task) {
        self.bucket_mut(task.priority).push_front(task);
    }

    /// 가장 높은 우선순위 버킷의 첫 작업을 꺼냅니다.
    pub fn pop(&mut self) -> Option<Task> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    /// 전체 대기 작업 수
    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    /// 대기열이 비었는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 특정 우선순위의 대기 작업 수
    pub fn len_of(&self, priority: TaskPriority) -> usize {
        match priority {
            TaskPriority::High => self.high.len(),
            TaskPriority::Normal => self.normal.len(),
            TaskPriority::Low => self.low.len(),
        }
    }

    /// 모든 작업을 버리고 버린 수를 반환합니다.
    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.high.clear();
        self.normal.clear();
        self.low.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskRequest;

    fn task(priority: TaskPriority, n: u64) -> Task {
        Task::from_request(TaskRequest::new("t", priority, serde_json::json!(n)))
    }

    #[test]
    fn pops_highest_priority_first() {
        let mut queue = PriorityQueue::new();
        queue.push(task(TaskPriority::Low, 1));
        queue.push(task(TaskPriority::Normal, 2));
        queue.push(task(TaskPriority::High, 3));

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|t| t.priority)
            .collect();
        assert_eq!(
            order,
            vec![TaskPriority::High, TaskPriority::Normal, TaskPriority::Low]
        );
    }

    #[test]
    fn fifo_within_bucket() {
        let mut queue = PriorityQueue::new();
        for n in 0..5 {
            queue.push(task(TaskPriority::Normal, n));
        }
        let payloads: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|t| t.payload)
            .collect();
        let expected: Vec<_> = (0..5).map(|n| serde_json::json!(n)).collect();
        assert_eq!(payloads, expected);
    }

    #[test]
    fn push_front_restores_head() {
        let mut queue = PriorityQueue::new();
        queue.push(task(TaskPriority::High, 1));
        queue.push(task(TaskPriority::High, 2));
        let head = queue.pop().unwrap();
        queue.push_front(head);
        assert_eq!(queue.pop().unwrap().payload, serde_json::json!(1));
    }

    #[test]
    fn clear_reports_dropped_count() {
        let mut queue = PriorityQueue::new();
        queue.push(task(TaskPriority::High, 1));
        queue.push(task(TaskPriority::Low, 2));
        assert_eq!(queue.len_of(TaskPriority::Low), 1);
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }
}
