//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use plib::testing::{run_test, run_test_with_checker, TestPlan};

fn sed_test(
    args: &[&str],
    test_data: &str,
    expected_output: &str,
    expected_err: &str,
    expected_exit_code: i32,
) {
    let str_args: Vec<String> = args.iter().map(|s| String::from(*s)).collect();

    run_test(TestPlan {
        cmd: String::from("sed"),
        args: str_args,
        stdin_data: String::from(test_data),
        expected_out: String::from(expected_output),
        expected_err: String::from(expected_err),
        expected_exit_code,
    });
}

/// Like `sed_test`, but only checks that stderr *contains* `expected_err_substr`
/// rather than matching it exactly; used for parse errors where the byte
/// offset embedded in the message isn't worth hand-computing in a test.
fn sed_test_err_contains(args: &[&str], test_data: &str, expected_err_substr: &str) {
    let str_args: Vec<String> = args.iter().map(|s| String::from(*s)).collect();
    run_test_with_checker(
        TestPlan {
            cmd: String::from("sed"),
            args: str_args,
            stdin_data: String::from(test_data),
            expected_out: String::new(),
            expected_err: String::new(),
            expected_exit_code: 1,
        },
        |plan, output| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            assert!(
                stderr.contains(expected_err_substr),
                "expected stderr to contain {:?}, got {:?}",
                expected_err_substr,
                stderr
            );
            assert_eq!(output.status.code(), Some(plan.expected_exit_code));
        },
    );
}

const ABC_FILE: &str = "tests/sed/assets/abc";
const CBA_FILE: &str = "tests/sed/assets/cba";
const SCRIPT_A_FILE: &str = "tests/sed/assets/script_a";
const SCRIPT_B_FILE: &str = "tests/sed/assets/script_b";

#[cfg(test)]
mod tests {
    use super::*;

    // -- CLI assembly: -e, -f, positional script, multiple files --------

    #[test]
    fn single_expression_from_stdin() {
        sed_test(&["s/a/ab/g"], "abc", "abbc\n", "", 0);
    }

    #[test]
    fn single_expression_via_dash_e() {
        sed_test(&["-e", "s/a/ab/g"], "abc", "abbc\n", "", 0);
    }

    #[test]
    fn script_from_dash_f_file() {
        sed_test(&["-f", SCRIPT_A_FILE, ABC_FILE], "", "abbc\n", "", 0);
    }

    #[test]
    fn multiple_dash_e_concatenate_in_order() {
        sed_test(
            &["-e", "s/a/ab/g", "-e", "s/b/bc/g", ABC_FILE],
            "",
            "abcbcc\n",
            "",
            0,
        );
    }

    #[test]
    fn mixed_dash_e_and_dash_f() {
        sed_test(
            &["-e", "s/a/ab/g", "-f", SCRIPT_B_FILE, ABC_FILE],
            "",
            "abcbcc\n",
            "",
            0,
        );
    }

    #[test]
    fn multiple_input_files_are_concatenated() {
        sed_test(&["s/a/ab/g", ABC_FILE, CBA_FILE], "", "abbc\ncbab\n", "", 0);
    }

    #[test]
    fn input_files_processed_in_argument_order() {
        sed_test(&["s/a/ab/g", CBA_FILE, ABC_FILE], "", "cbab\nabbc\n", "", 0);
    }

    // -- spec scenarios (section 8) --------------------------------------

    #[test]
    fn scenario_global_substitute() {
        sed_test(&["s/o/0/g"], "hello\nworld\n", "hell0\nw0rld\n", "", 0);
    }

    #[test]
    fn scenario_quiet_with_line_address_print() {
        sed_test(&["-n", "2p"], "a\nb\nc\n", "b\n", "", 0);
    }

    #[test]
    fn scenario_last_line_only() {
        sed_test(&["$!d"], "1\n2\n3\n4\n", "4\n", "", 0);
    }

    #[test]
    fn scenario_join_lines() {
        sed_test(&[r"N;s/\n/ /"], "foo\nbar\n", "foo bar\n", "", 0);
    }

    #[test]
    fn scenario_get_hold_appends_empty() {
        sed_test(&["G"], "x\ny\n", "x\n\ny\n\n", "", 0);
    }

    #[test]
    fn scenario_nth_match() {
        sed_test(&["s/a/b/2"], "aaa\n", "aba\n", "", 0);
    }

    #[test]
    fn scenario_nth_and_global() {
        sed_test(&["s/a/b/2g"], "aaa\n", "abb\n", "", 0);
    }

    #[test]
    fn scenario_label_loop() {
        sed_test(&[": loop\ns/x/y/\nt loop"], "xxx\n", "yyy\n", "", 0);
    }

    // -- addresses and ranges --------------------------------------------

    #[test]
    fn range_print_doubles_selected_lines() {
        sed_test(
            &["-e", r"\/start/,\/end/p"],
            "a\nb\nc\nstart\nt\n\nu\nend\nert\nqwerty",
            "a\nb\nc\nstart\nstart\nt\nt\n\n\nu\nu\nend\nend\nert\nqwerty\n",
            "",
            0,
        );
    }

    #[test]
    fn range_with_last_line_address_stays_open_to_eof() {
        sed_test(
            &["-e", r"\/start/,$p"],
            "a\nb\nc\nstart\nt\n\nu\nend\nert\nqwerty",
            "a\nb\nc\nstart\nstart\nt\nt\n\n\nu\nu\nend\nend\nert\nert\nqwerty\nqwerty\n",
            "",
            0,
        );
    }

    #[test]
    fn range_from_line_one() {
        sed_test(
            &["-e", r"1,\/end/p"],
            "a\nb\nc\nstart\nt\n\nu\nend\nert\nqwerty",
            "a\na\nb\nb\nc\nc\nstart\nstart\nt\nt\n\n\nu\nu\nend\nend\nert\nqwerty\n",
            "",
            0,
        );
    }

    #[test]
    fn negated_range_with_space_before_bang() {
        // GNU-compatible extension: whitespace is allowed between the address
        // list and `!`.
        sed_test(
            &["-e", "2,4 !p"],
            "a\nb\nc\nstart\nt\n\nu\nend\nert\nqwerty",
            "a\na\nb\nc\nstart\nt\nt\n\n\nu\nu\nend\nend\nert\nert\nqwerty\nqwerty\n",
            "",
            0,
        );
    }

    #[test]
    fn negated_block_with_space_before_bang() {
        sed_test(
            &["-e", "2,4 !{p}"],
            "a\nb\nc\nstart\nt\n\nu\nend\nert\nqwerty",
            "a\na\nb\nc\nstart\nt\nt\n\n\nu\nu\nend\nend\nert\nert\nqwerty\nqwerty\n",
            "",
            0,
        );
    }

    #[test]
    fn unknown_command_after_address_is_a_parse_error() {
        sed_test_err_contains(
            &["-e", r"\/pattern/- p"],
            "a\nb\nc\nstart\nt\n\nu\nend\nert\nqwerty",
            "unknown command",
        );
    }

    #[test]
    fn custom_delimiter_regex_addresses() {
        sed_test(
            &["-e", r"\:start:,\,stop, p"],
            "a\nb\nc\nstart\nt\n\nu\nend\nert\nqwerty",
            "a\nb\nc\nstart\nstart\nt\nt\n\n\nu\nu\nend\nend\nert\nert\nqwerty\nqwerty\n",
            "",
            0,
        );
    }

    #[test]
    fn step_address_selects_every_other_line() {
        sed_test(
            &["-n", "1~2p"],
            "1\n2\n3\n4\n5\n",
            "1\n3\n5\n",
            "",
            0,
        );
    }

    #[test]
    fn regex_range_addr2_never_closes_on_the_opening_record() {
        // addr2 must match a *later* record, never the one that opened the
        // range, so `/a/,/a/` spans the whole first-to-second `a` run
        // rather than collapsing to a single line.
        sed_test(&["-n", "/a/,/a/p"], "a\nb\na\n", "a\nb\na\n", "", 0);
    }

    #[test]
    fn relative_plus_range() {
        sed_test(
            &["-n", "2,+1p"],
            "1\n2\n3\n4\n",
            "2\n3\n",
            "",
            0,
        );
    }

    // -- substitution semantics -------------------------------------------

    #[test]
    fn substitute_whole_match_ampersand() {
        sed_test(&[r#"s/.*/[&]/"#], "This is a test\nAnother test line", "[This is a test]\n[Another test line]\n", "", 0);
    }

    #[test]
    fn substitute_chained_literal_replacements() {
        sed_test(
            &["s/scarlet/red/g;s/ruby/red/g;s/puce/red/g"],
            "The scarlet sky turned ruby as the puce evening settled.",
            "The red sky turned red as the red evening settled.\n",
            "",
            0,
        );
    }

    #[test]
    fn substitute_escaped_delimiter_in_replacement() {
        sed_test(
            &["s/SUBST/program\\/lib\\/module\\/lib.so/"],
            "this is a test SUBST\nwe use SUBST here as well",
            "this is a test program/lib/module/lib.so\nwe use program/lib/module/lib.so here as well\n",
            "",
            0,
        );
    }

    #[test]
    fn substitute_print_flag_doubles_with_default_print() {
        sed_test(
            &["s/WORD/Hello World/p ; p"],
            "WORD is here\nthis is not word",
            "Hello World is here\nHello World is here\nHello World is here\nthis is not word\nthis is not word\n",
            "",
            0,
        );
    }

    #[test]
    fn transliterate_uppercase_to_lowercase() {
        sed_test(
            &["y:ABCDEFGHIJKLMNOPQRSTUVWXYZ:abcdefghijklmnopqrstuvwxyz:"],
            "ABC\n\n1234\nabcdefg",
            "abc\n\n1234\nabcdefg\n",
            "",
            0,
        );
    }

    #[test]
    fn delete_blank_lines_then_append_empty_hold() {
        // `/^$/d` removes every blank line; the survivors each get an empty
        // hold space appended via `G`, doubling their trailing newline.
        sed_test(
            &[r"\/^$/d;G"],
            "Line 1\n\nLine 2\nLine 3\n\n\nLine 4",
            "Line 1\n\nLine 2\n\nLine 3\n\nLine 4\n\n",
            "",
            0,
        );
    }

    #[test]
    fn trim_leading_and_trailing_blanks() {
        sed_test(
            &[r"s/^[ \t]*//;s/[ \t]*$//"],
            "    hello world    ",
            "hello world\n",
            "",
            0,
        );
    }

    #[test]
    fn join_first_matching_line_with_next() {
        sed_test(&[r"\/./N; s/\n/ /"], "line1\nline2", "line1 line2\n", "", 0);
    }

    #[test]
    fn remove_last_character_of_each_line() {
        sed_test(&["s/.$//"], "line1\nline2", "line\nline\n", "", 0);
    }

    // -- ERE mode (-E) -----------------------------------------------------

    #[test]
    fn extended_regex_alternation_and_plus() {
        sed_test(
            &["-E", "s/(foo|bar)+/X/g"],
            "foobar baz foo",
            "X baz X\n",
            "",
            0,
        );
    }

    #[test]
    fn basic_regex_requires_escaped_metacharacters() {
        // In BRE, a bare `+` is literal; only `\+` is one-or-more.
        sed_test(&["s/a\\+/X/"], "aaab", "Xb\n", "", 0);
        sed_test(&["s/a+/X/"], "a+b", "Xb\n", "", 0);
    }

    // -- hold space laws ----------------------------------------------------

    #[test]
    fn hold_then_get_is_identity() {
        sed_test(&["h;g"], "unchanged\n", "unchanged\n", "", 0);
    }

    #[test]
    fn double_exchange_is_identity() {
        sed_test(&["x;x"], "unchanged\n", "unchanged\n", "", 0);
    }

    #[test]
    fn noop_transliteration() {
        sed_test(&["y/ab/ab/"], "ababab\n", "ababab\n", "", 0);
    }

    // -- line numbers, filenames, listing ------------------------------------

    #[test]
    fn print_line_number() {
        sed_test(&["-n", "="], "a\nb\nc\n", "1\n2\n3\n", "", 0);
    }

    #[test]
    fn list_command_escapes_control_bytes() {
        sed_test(&["-n", "l"], "a\tb\n", "a\\tb$\n", "", 0);
    }

    // -- quit / branch --------------------------------------------------------

    #[test]
    fn quit_stops_after_printing_current_line() {
        sed_test(&["2q"], "a\nb\nc\n", "a\nb\n", "", 0);
    }

    #[test]
    fn quit_with_exit_code() {
        sed_test(&["2q5"], "a\nb\nc\n", "a\nb\n", "", 5);
    }

    #[test]
    fn capital_q_suppresses_final_print() {
        sed_test(&["2Q"], "a\nb\nc\n", "a\n", "", 0);
    }

    #[test]
    fn branch_to_end_of_script() {
        sed_test(&["/a/b\ns/.*/no/"], "a\nb\n", "a\nno\n", "", 0);
    }

    #[test]
    fn t_branches_only_after_successful_substitution() {
        sed_test(
            &["s/a/b/;tX;s/$/ (no match)/;:X"],
            "a\nc\n",
            "b\nc (no match)\n",
            "",
            0,
        );
    }

    // -- separate mode ---------------------------------------------------

    #[test]
    fn separate_mode_resets_dollar_per_file() {
        sed_test(
            &["-s", "-n", "$p", ABC_FILE, CBA_FILE],
            "",
            "abc\ncba\n",
            "",
            0,
        );
    }

    // -- empty-script identity invariants ---------------------------------

    #[test]
    fn empty_script_is_identity_without_suppress() {
        sed_test(&[""], "hello\nworld\n", "hello\nworld\n", "", 0);
    }

    #[test]
    fn empty_script_with_quiet_produces_no_output() {
        sed_test(&["-n", ""], "hello\nworld\n", "", "", 0);
    }

    // -- sandbox mode --------------------------------------------------------

    #[test]
    fn sandbox_mode_rejects_w_command() {
        sed_test_err_contains(
            &["--sandbox", "w /tmp/should-not-be-created"],
            "a\n",
            "sandbox",
        );
    }
}
