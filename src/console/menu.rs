//! Menu buffer and scroll windowing

/// Prefix placed before every menu item.
const MENU_ITEM_HEADER: &str = " ";

/// Header lines plus selectable items, with a selection kept inside a
/// scrolling window of `max_rows` screen rows.
#[derive(Debug, Clone)]
pub struct MenuBuffer {
    headers: Vec<String>,
    items: Vec<String>,
    selected: usize,
    scroll: usize,
    visible: bool,
    /// Screen rows available to headers and items together.
    max_rows: usize,
    /// Most rows (headers + items) the buffer keeps.
    capacity: usize,
    header_cols: usize,
    item_cols: usize,
}

impl MenuBuffer {
    pub fn new(max_rows: usize, capacity: usize, header_cols: usize, item_cols: usize) -> Self {
        Self {
            headers: Vec::new(),
            items: Vec::new(),
            selected: 0,
            scroll: 0,
            visible: false,
            max_rows: max_rows.max(1),
            capacity: capacity.max(1),
            header_cols,
            item_cols,
        }
    }

    /// Load a new menu and show it. Returns the number of items kept.
    ///
    /// Headers that would leave no room for an item row are dropped; items past
    /// the buffer capacity are dropped.
    pub fn start<H, I>(&mut self, headers: &[H], items: &[I], initial_selection: usize) -> usize
    where
        H: AsRef<str>,
        I: AsRef<str>,
    {
        let header_room = self.max_rows.saturating_sub(1).min(self.capacity - 1);
        self.headers = headers
            .iter()
            .take(header_room)
            .map(|h| truncate(h.as_ref(), self.header_cols))
            .collect();

        let item_room = self.capacity - self.headers.len();
        self.items = items
            .iter()
            .take(item_room)
            .map(|i| truncate(&format!("{MENU_ITEM_HEADER}{}", i.as_ref()), self.item_cols))
            .collect();

        self.visible = true;
        self.selected = if self.items.is_empty() { 0 } else { initial_selection % self.items.len() };
        self.scroll = 0;
        self.window();
        self.items.len()
    }

    /// Select `index`, wrapping around both ends. When no menu is shown the
    /// index is returned unchanged.
    pub fn select(&mut self, index: i32) -> i32 {
        if !self.visible || self.items.is_empty() {
            return index;
        }
        self.select_wrapped(i64::from(index))
    }

    /// Move the selection by `delta` rows, wrapping.
    pub fn move_selection(&mut self, delta: i32) -> i32 {
        if !self.visible || self.items.is_empty() {
            return self.selected as i32;
        }
        self.select_wrapped(self.selected as i64 + i64::from(delta))
    }

    pub fn end(&mut self) -> bool {
        std::mem::replace(&mut self.visible, false)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Item rows that fit under the headers.
    pub fn visible_rows(&self) -> usize {
        self.max_rows.saturating_sub(self.headers.len()).max(1)
    }

    /// Items inside the scroll window, with their absolute indices.
    pub fn window_items(&self) -> impl Iterator<Item = (usize, &str)> {
        self.items
            .iter()
            .enumerate()
            .skip(self.scroll)
            .take(self.visible_rows())
            .map(|(i, s)| (i, s.as_str()))
    }

    fn select_wrapped(&mut self, index: i64) -> i32 {
        self.selected = index.rem_euclid(self.items.len() as i64) as usize;
        self.window();
        self.selected as i32
    }

    /// Keep the selected row inside the window.
    fn window(&mut self) {
        let headers = self.headers.len();
        if self.selected < self.scroll {
            self.scroll = self.selected;
        }
        if self.selected - self.scroll + headers >= self.max_rows {
            self.scroll = self.selected + headers + 1 - self.max_rows;
        }
    }
}

fn truncate(text: &str, cols: usize) -> String {
    text.chars().take(cols).collect()
}
