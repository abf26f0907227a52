use tracing::error;

/// Reassembles DATA_FIRST .. DATA .. DATA_LAST sequences.
///
/// The advertised total length is kept as a cross-check: overruns drop the
/// whole message rather than delivering garbage.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CompleteData {
    total_length: usize,
    data: Vec<u8>,
    in_progress: bool,
}

impl CompleteData {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn process_data_first(&mut self, total_length: usize, data: &[u8]) -> Option<Vec<u8>> {
        if self.in_progress {
            error!("Incomplete DVC message dropped by a new DATA_FIRST");
            self.data.clear();
        }

        if total_length == data.len() {
            // Degenerate fragmentation: the first frame already carries
            // everything.
            self.in_progress = false;
            return Some(data.to_vec());
        }

        self.total_length = total_length;
        self.data.clear();
        self.data.extend_from_slice(data);
        self.in_progress = true;

        None
    }

    pub(crate) fn process_data(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        if !self.append_checked(data) {
            return None;
        }

        None
    }

    pub(crate) fn process_data_last(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        if !self.append_checked(data) {
            return None;
        }

        if self.data.len() != self.total_length {
            error!(
                received = self.data.len(),
                expected = self.total_length,
                "DVC message shorter than advertised, dropped"
            );
            self.reset();
            return None;
        }

        self.in_progress = false;
        Some(core::mem::take(&mut self.data))
    }

    fn append_checked(&mut self, data: &[u8]) -> bool {
        if !self.in_progress {
            error!("DVC data fragment without a DATA_FIRST, dropped");
            return false;
        }

        if self.data.len() + data.len() > self.total_length {
            error!(
                received = self.data.len() + data.len(),
                expected = self.total_length,
                "DVC message longer than advertised, dropped"
            );
            self.reset();
            return false;
        }

        self.data.extend_from_slice(data);
        true
    }

    fn reset(&mut self) {
        self.in_progress = false;
        self.total_length = 0;
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_concatenate_in_order() {
        let mut complete = CompleteData::new();

        assert_eq!(complete.process_data_first(6, &[1, 2]), None);
        assert_eq!(complete.process_data(&[3, 4]), None);
        assert_eq!(complete.process_data_last(&[5, 6]), Some(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn oversized_message_is_dropped() {
        let mut complete = CompleteData::new();

        complete.process_data_first(3, &[1, 2]);
        assert_eq!(complete.process_data_last(&[3, 4]), None);

        // The reassembler must be usable again afterwards.
        assert_eq!(complete.process_data_first(1, &[9]), Some(vec![9]));
    }

    #[test]
    fn lone_fragment_is_dropped() {
        let mut complete = CompleteData::new();
        assert_eq!(complete.process_data_last(&[1, 2]), None);
    }
}
