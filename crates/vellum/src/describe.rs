//! Human-readable rendering of objects.
//!
//! ```text
//! AllTypes {
//! 	intCol = 1;
//! 	objectCol = BoolObject {
//! 		boolCol = true;
//! 	};
//! 	arrayCol = List<BoolObject> (
//! 		[0] BoolObject {
//! 			boolCol = false;
//! 		}
//! 	);
//! }
//! ```
//!
//! Links and lists nested deeper than the configured depth print
//! `<Maximum depth exceeded>`, which also bounds cycles.

use std::fmt::{self, Write};

use vellum_schema::PropertyDescriptor;

use crate::accessor::Property;
use crate::config::Configuration;
use crate::error::Error;
use crate::list::List;
use crate::object::Object;

const MAX_DEPTH_EXCEEDED: &str = "<Maximum depth exceeded>";
const INVALID_OBJECT: &str = "[invalid object]";
const WRONG_THREAD: &str = "[object on another thread]";

/// Write the description of `object` into `out`.
pub(crate) fn describe<W: Write>(out: &mut W, object: &Object) -> fmt::Result {
    let max_depth = object
        .database()
        .map(|db| db.config().max_description_depth)
        .unwrap_or_else(|| Configuration::default().max_description_depth);
    write_object(out, object, 0, max_depth)
}

fn placeholder(err: &Error) -> &'static str {
    match err {
        Error::WrongThread => WRONG_THREAD,
        _ => INVALID_OBJECT,
    }
}

/// Why a managed object cannot be read right now, if it cannot.
fn unreadable(object: &Object) -> Option<&'static str> {
    let binding = object.binding()?;
    if let Err(err) = binding.session.check_thread() {
        return Some(placeholder(&err));
    }
    match binding.session.read_row(binding.row) {
        Ok(Some(_)) => None,
        Ok(None) => Some(INVALID_OBJECT),
        Err(err) => Some(placeholder(&err)),
    }
}

fn indent<W: Write>(out: &mut W, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        out.write_char('\t')?;
    }
    Ok(())
}

fn write_object<W: Write>(out: &mut W, object: &Object, depth: usize, max_depth: usize) -> fmt::Result {
    if let Some(text) = unreadable(object) {
        return out.write_str(text);
    }
    writeln!(out, "{} {{", object.class_name())?;
    for prop in object.schema().persisted_properties() {
        indent(out, depth + 1)?;
        write!(out, "{} = ", prop.name)?;
        match object.value(&prop.name) {
            Ok(Property::Value(value)) => write!(out, "{value}")?,
            Ok(Property::Object(None)) => out.write_str("(null)")?,
            Ok(Property::Object(Some(_)) | Property::List(_)) if depth >= max_depth => {
                out.write_str(MAX_DEPTH_EXCEEDED)?
            }
            Ok(Property::Object(Some(target))) => write_object(out, &target, depth + 1, max_depth)?,
            Ok(Property::List(list)) => write_list(out, prop, &list, depth + 1, max_depth)?,
            Ok(Property::LinkingObjects(_)) => {}
            Err(err) => out.write_str(placeholder(&err))?,
        }
        out.write_str(";\n")?;
    }
    indent(out, depth)?;
    out.write_char('}')
}

fn write_list<W: Write>(
    out: &mut W,
    prop: &PropertyDescriptor,
    list: &List,
    depth: usize,
    max_depth: usize,
) -> fmt::Result {
    let items = match list.to_vec() {
        Ok(items) => items,
        Err(err) => return out.write_str(placeholder(&err)),
    };
    writeln!(out, "{} (", prop.type_label())?;
    for (index, item) in items.iter().enumerate() {
        indent(out, depth + 1)?;
        write!(out, "[{index}] ")?;
        match item {
            Property::Object(Some(object)) => write_object(out, object, depth + 1, max_depth)?,
            Property::Value(value) => write!(out, "{value}")?,
            _ => out.write_str("(null)")?,
        }
        out.write_char('\n')?;
    }
    indent(out, depth)?;
    out.write_char(')')
}
