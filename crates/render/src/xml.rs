//! sitemaps.org 0.9 XML documents, written with [`quick_xml`].

use crate::error::{ErrorKind, Result};
use crate::serializer::{IndexEntry, RenderContext, Serializer};
use exn::ResultExt;
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use sitemap_model::UrlRecord;
use std::io::Cursor;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
const IMAGE_NS: &str = "http://www.google.com/schemas/sitemap-image/1.1";
const GENERATED_BY: &str = concat!(" Generated by ", env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"), " ");

/// The default serializer, registered as `default`.
#[derive(Debug, Clone, Default)]
pub struct XmlSerializer;

impl XmlSerializer {
    pub const ID: &'static str = "default";

    fn begin(context: &RenderContext<'_>) -> Result<Writer<Cursor<Vec<u8>>>> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .or_raise(|| ErrorKind::Xml)?;
        if let Some(href) = context.stylesheet {
            let instruction = format!(r#"xml-stylesheet type="text/xsl" href="{}""#, escape(href));
            writer.write_event(Event::PI(BytesPI::new(instruction))).or_raise(|| ErrorKind::Xml)?;
        }
        // Comment content is written verbatim and never contains markup.
        writer
            .write_event(Event::Comment(BytesText::from_escaped(GENERATED_BY)))
            .or_raise(|| ErrorKind::Xml)?;
        Ok(writer)
    }

    fn finish(writer: Writer<Cursor<Vec<u8>>>) -> Result<String> {
        String::from_utf8(writer.into_inner().into_inner()).or_raise(|| ErrorKind::Xml)
    }

    fn write_url(writer: &mut Writer<Cursor<Vec<u8>>>, link: &UrlRecord) -> Result<()> {
        start(writer, BytesStart::new("url"))?;
        text_element(writer, "loc", &link.url)?;
        if let Some(last_modified) = link.last_modified {
            text_element(writer, "lastmod", &format_date(last_modified, "lastmod")?)?;
        }
        if let Some(change_frequency) = link.change_frequency {
            text_element(writer, "changefreq", change_frequency.as_str())?;
        }
        if let Some(priority) = link.priority {
            text_element(writer, "priority", &format!("{:.1}", priority.clamp(0.0, 1.0)))?;
        }
        for image in &link.images {
            start(writer, BytesStart::new("image:image"))?;
            text_element(writer, "image:loc", &image.url)?;
            if let Some(title) = &image.title {
                text_element(writer, "image:title", title)?;
            }
            if let Some(caption) = &image.caption {
                text_element(writer, "image:caption", caption)?;
            }
            end(writer, "image:image")?;
        }
        end(writer, "url")
    }
}

impl Serializer for XmlSerializer {
    fn id(&self) -> &str {
        Self::ID
    }

    fn chunk_document(&self, context: &RenderContext<'_>, links: &[UrlRecord]) -> Result<String> {
        let mut writer = Self::begin(context)?;
        let mut urlset = BytesStart::new("urlset").with_attributes([("xmlns", SITEMAP_NS)]);
        if links.iter().any(|link| !link.images.is_empty()) {
            urlset.push_attribute(("xmlns:image", IMAGE_NS));
        }
        start(&mut writer, urlset)?;
        for link in links {
            Self::write_url(&mut writer, link)?;
        }
        end(&mut writer, "urlset")?;
        tracing::trace!(variant = context.variant, links = links.len(), "Serialized chunk");
        Self::finish(writer)
    }

    fn index_document(&self, context: &RenderContext<'_>, entries: &[IndexEntry]) -> Result<String> {
        let mut writer = Self::begin(context)?;
        start(&mut writer, BytesStart::new("sitemapindex").with_attributes([("xmlns", SITEMAP_NS)]))?;
        for entry in entries {
            start(&mut writer, BytesStart::new("sitemap"))?;
            text_element(&mut writer, "loc", &entry.url)?;
            if let Some(last_modified) = entry.last_modified {
                text_element(&mut writer, "lastmod", &format_date(last_modified, "lastmod")?)?;
            }
            end(&mut writer, "sitemap")?;
        }
        end(&mut writer, "sitemapindex")?;
        Self::finish(writer)
    }
}

fn start(writer: &mut Writer<Cursor<Vec<u8>>>, element: BytesStart<'_>) -> Result<()> {
    writer.write_event(Event::Start(element)).or_raise(|| ErrorKind::Xml)
}

fn end(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name))).or_raise(|| ErrorKind::Xml)
}

fn text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<()> {
    start(writer, BytesStart::new(name))?;
    writer.write_event(Event::Text(BytesText::new(text))).or_raise(|| ErrorKind::Xml)?;
    end(writer, name)
}

fn format_date(date: OffsetDateTime, field: &'static str) -> Result<String> {
    date.format(&Rfc3339).or_raise(|| ErrorKind::Date(field))
}
