use super::{Command, Control};

/// TEST UNIT READY (op code 0x00): status only, no data transfer.
/// CHECK CONDITION (e.g. sense key NOT_READY for "no medium present")
/// surfaces through `ExecuteError`/`SCSIError` rather than this type.
#[derive(Debug)]
pub struct TestUnitReady {
    control: Control,
}

impl TestUnitReady {
    pub fn new(control: Control) -> Self {
        Self { control }
    }
}

impl Command<6> for TestUnitReady {
    const OP_CODE: u8 = 0x00;

    type Response = Vec<u8>;

    fn as_cdb(&self) -> [u8; 6] {
        let mut bytes = [0u8; 6];
        bytes[0] = Self::OP_CODE;
        bytes[5] = self.control.into();
        bytes
    }

    fn allocation_len(&self) -> usize {
        0
    }
}
