//! Conditional and statement tag tests

use super::helpers::{render_ok, simple_context};
use super::*;

fn with_n(n: i64) -> TemplateContext {
    TemplateContext::empty().with("n", n)
}

#[test]
fn test_if_elif_else_chain() {
    let template = "{% if n > 10 %}big{% elif n > 5 %}mid{% else %}small{% endif %}";
    assert_eq!(render_ok(template, &with_n(20)), "big");
    assert_eq!(render_ok(template, &with_n(7)), "mid");
    assert_eq!(render_ok(template, &with_n(1)), "small");
}

#[test]
fn test_elif_spellings() {
    for keyword in ["elif", "elsif", "elseif", "else if"] {
        let template = format!("{{% if n == 1 %}}one{{% {} n == 2 %}}two{{% endif %}}", keyword);
        assert_eq!(render_ok(&template, &with_n(2)), "two", "{}", keyword);
        assert_eq!(render_ok(&template, &with_n(3)), "", "{}", keyword);
    }
}

#[test]
fn test_only_first_true_branch_runs() {
    let template = "{% if n > 0 %}a{% elif n > 1 %}b{% elif n > 2 %}c{% endif %}";
    assert_eq!(render_ok(template, &with_n(5)), "a");
}

#[test]
fn test_unless() {
    let template = "{% unless done %}todo{% else %}ok{% endunless %}";
    assert_eq!(
        render_ok(template, &TemplateContext::empty().with("done", false)),
        "todo"
    );
    assert_eq!(
        render_ok(template, &TemplateContext::empty().with("done", true)),
        "ok"
    );
}

#[test]
fn test_truthiness() {
    for falsy in ["0", "0.0", "''", "[]", "nil", "false"] {
        let template = format!("{{% if {} %}}yes{{% else %}}no{{% endif %}}", falsy);
        assert_eq!(render_ok(&template, &TemplateContext::empty()), "no", "{}", falsy);
    }
    for truthy in ["1", "'0'", "[0]", "-1"] {
        let template = format!("{{% if {} %}}yes{{% else %}}no{{% endif %}}", truthy);
        assert_eq!(render_ok(&template, &TemplateContext::empty()), "yes", "{}", truthy);
    }
}

#[test]
fn test_conditions_with_contains_and_filters() {
    let context = simple_context();
    assert_eq!(
        render_ok("{% if tags contains 'rust' %}yes{% endif %}", &context),
        "yes"
    );
    assert_eq!(
        render_ok("{% if 'go' not in tags %}no go{% endif %}", &context),
        "no go"
    );
    assert_eq!(
        render_ok("{% if (tags | @size) == 2 and enabled %}two{% endif %}", &context),
        "two"
    );
}

#[test]
fn test_case_when_first_match() {
    let template = "{% case n %}{% when 1 %}one{% when 2, 3 %}two-three{% when 3 %}three\
                    {% else %}other{% endcase %}";
    assert_eq!(render_ok(template, &with_n(1)), "one");
    assert_eq!(render_ok(template, &with_n(3)), "two-three");
    assert_eq!(render_ok(template, &with_n(9)), "other");
}

#[test]
fn test_case_without_when_renders_nothing() {
    assert_eq!(render_ok("[{% case n %}{% endcase %}]", &with_n(1)), "[]");
}

#[test]
fn test_case_on_strings() {
    let template = "{% case kind %}{% when 'a' %}A{% when 'b' %}B{% endcase %}";
    assert_eq!(
        render_ok(template, &TemplateContext::empty().with("kind", "b")),
        "B"
    );
}

#[test]
fn test_assign_and_counters() {
    let context = simple_context();
    assert_eq!(
        render_ok("{% assign total = price * 2 %}{{ total }}", &context),
        "19.98"
    );
    assert_eq!(
        render_ok(
            "{% assign c = 1 %}{% increment c %}{% increment c %}{{ c }}{% decrement c %}{{ c }}",
            &context
        ),
        "32"
    );
    assert_eq!(
        render_ok("{% assign pair = (1, 'x') %}{{ pair[1] }}", &context),
        "x"
    );
}

#[test]
fn test_assign_with_filter_chain() {
    let context = simple_context();
    assert_eq!(
        render_ok("{% assign t = title | @downcase %}{{ t }}", &context),
        "my title"
    );
}

#[test]
fn test_python_statement_tag() {
    let context = TemplateContext::empty();
    assert_eq!(render_ok("{% python x = 2 + 3 %}{{ x }}", &context), "5");
    // Expressions are evaluated for their side effects only
    assert_eq!(render_ok("[{% python 1 + 1 %}]", &context), "[]");
    assert_eq!(render_ok("{% python ok = 1 == 1 %}{{ ok }}", &context), "true");
}

#[test]
fn test_paginate_renders_body() {
    let context = simple_context();
    assert_eq!(
        render_ok("{% paginate tags by 2 %}{{ title }}{% endpaginate %}", &context),
        "My Title"
    );
}

#[test]
fn test_raw_block_is_verbatim() {
    let context = simple_context();
    let template = "{% raw %}{{ title }} {% if %}{# x #}{% endraw %}!";
    assert_eq!(render_ok(template, &context), "{{ title }} {% if %}{# x #}!");
}

#[test]
fn test_comment_block_is_prefixed() {
    let context = TemplateContext::empty();
    assert_eq!(
        render_ok("{% comment %}note{% endcomment %}", &context),
        "# note"
    );
    assert_eq!(
        render_ok("{% comment // %}a\nb{% endcomment %}", &context),
        "// a\n// b"
    );
    assert_eq!(
        render_ok("{% comment %}{{ ignored }}{% endcomment %}", &context),
        "# {{ ignored }}"
    );
    assert_eq!(
        render_ok("{% comment %}first\n  indented\n\tlast{% endcomment %}", &context),
        "# first\n# indented\n# last"
    );
}

#[test]
fn test_note_tags_render_nothing() {
    assert_eq!(
        render_ok("a{# hidden {{ x }} #}b", &TemplateContext::empty()),
        "ab"
    );
}

#[test]
fn test_filter_with_arguments_in_condition() {
    let template = "{% if x | @append: 'a' == 'ba' %}T{% else %}F{% endif %}";
    let with_x = |x: &str| TemplateContext::empty().with("x", x);
    assert_eq!(render_ok(template, &with_x("b")), "T");
    assert_eq!(render_ok(template, &with_x("c")), "F");

    let context = simple_context();
    assert_eq!(
        render_ok("{% if tags | @size == 2 and enabled %}two{% endif %}", &context),
        "two"
    );
    assert_eq!(
        render_ok("{% unless title | @truncate: 2, '' != 'My' %}short{% endunless %}", &context),
        "short"
    );
}
