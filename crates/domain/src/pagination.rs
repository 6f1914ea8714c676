/// 默认每页条数
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// 每页条数上限
pub const MAX_PAGE_SIZE: u32 = 100;

/// 分页参数，页码从 1 开始。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    /// 非正数页码按 1 处理，非正数条数按默认值处理，超过上限的条数截断。
    pub fn new(page: i64, page_size: i64) -> Self {
        let page = if page <= 0 {
            1
        } else {
            u32::try_from(page).unwrap_or(u32::MAX)
        };
        let page_size = if page_size <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            u32::try_from(page_size)
                .unwrap_or(MAX_PAGE_SIZE)
                .min(MAX_PAGE_SIZE)
        };
        Self { page, page_size }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, i64::from(DEFAULT_PAGE_SIZE))
    }
}
