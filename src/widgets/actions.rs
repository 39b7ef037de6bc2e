use hypertext::prelude::*;

/// A row of buttons, given as `(href, text)` pairs.
pub struct Actions<'r> {
    pub options: &'r [(String, String)],
}

impl Renderable for Actions<'_> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            @if !self.options.is_empty() {
                div class="row mt-3 mb-3" {
                    @for (link, text) in self.options {
                        div class="col-md-auto" {
                            a class="btn btn-primary"
                                href=(link) {
                                (text)
                            }
                        }
                    }
                }
            }
        }
        .render_to(buffer);
    }
}
