//! 二级存储：与主存同样大小的字数组，按页读写。

use crate::hal::{HwError, Word};

pub struct BackingStore {
    words: Vec<Word>,
}

impl BackingStore {
    pub fn new(size: usize) -> Self {
        Self {
            words: vec![0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }

    /// 读出从 `base` 开始的 `len` 个字
    pub fn read_page(&self, base: usize, len: usize) -> Result<&[Word], HwError> {
        self.words
            .get(base..base + len)
            .ok_or(HwError::InvalidAddress)
    }

    /// 从 `base` 开始写入一页
    pub fn write_page(&mut self, base: usize, page: &[Word]) -> Result<(), HwError> {
        let dst = self
            .words
            .get_mut(base..base + page.len())
            .ok_or(HwError::InvalidAddress)?;
        dst.copy_from_slice(page);
        Ok(())
    }
}
