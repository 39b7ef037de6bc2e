use hypertext::prelude::*;

use crate::views::Cell;

pub struct CellView<'a> {
    pub cell: &'a Cell,
}

impl Renderable for CellView<'_> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            @match &self.cell.url {
                Some(url) => {
                    a href=(url) { (self.cell.text) }
                }
                None => {
                    (self.cell.text)
                }
            }
        }
        .render_to(buffer);
    }
}

/// A striped table of (optionally linked) cells.
pub struct Table<'a> {
    pub headers: &'a [&'static str],
    pub rows: &'a [Vec<Cell>],
}

impl Renderable for Table<'_> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            table class="table table-striped table-hover" {
                thead {
                    tr {
                        @for header in self.headers {
                            th scope="col" { (header) }
                        }
                    }
                }
                tbody {
                    @if self.rows.is_empty() {
                        tr {
                            td colspan=(self.headers.len().to_string()) class="text-muted" {
                                "Nothing here yet."
                            }
                        }
                    }
                    @for row in self.rows {
                        tr {
                            @for cell in row {
                                td { CellView cell=(cell); }
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}
